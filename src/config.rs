use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf};
use tch::Device;

/// Environment variable pointing at a TOML file of sweep overrides
pub const SWEEP_CONFIG_VAR: &str = "LISTENER_SWEEP_CONFIG";
/// Exported so that downstream tooling agrees with the chosen metric sink
pub const MODE_VAR: &str = "WANDB_MODE";

/// The swept hyperparameters of a run.
///
/// Speaker-side values are carried so that sweeps share one key set with the
/// two-agent experiments, even though only the listener is trained here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hyperparameters {
    pub lr_speaker: f64,
    pub lr_listener: f64,
    pub speaker_ent_target: f64,
    pub ps_weight: f64,
    pub speaker_ent_bonus: f64,
    pub listener_ent_bonus: f64,
    pub speaker_lambda: f64,
    pub normalise_rewards: bool,
    pub epochs: u32,
    /// Weight of the baseline prediction loss
    pub pl_weight: f64,
    /// Weight of the self-imitation cross-entropy on rewarded answers
    pub ce_weight: f64,
    /// Train the listener's message pathway
    pub listener: bool,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            lr_speaker: 3e-4,
            lr_listener: 3e-4,
            speaker_ent_target: 1.0,
            ps_weight: 0.1,
            speaker_ent_bonus: 0.0,
            listener_ent_bonus: 0.0,
            speaker_lambda: 0.3,
            normalise_rewards: false,
            epochs: 17,
            pl_weight: 0.01,
            ce_weight: 0.001,
            listener: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunSettings {
    pub project: String,
    /// Keeps metrics local (offline mode) instead of sending them to the endpoint
    pub debugging: bool,
    /// One of `cpu`, `cuda`, `cuda:N`, `mps` or `auto`
    /// Auto will use your CUDA GPU if available
    pub device: String,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub metrics_endpoint: Option<String>,
    pub seed: i64,
    pub hidden_sizes: Vec<i64>,
    /// Reinitialize the listener's weights when a run starts
    pub reset_parameters: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            project: "reinforce_mnist".to_string(),
            debugging: false,
            device: "auto".to_string(),
            data_dir: PathBuf::from("data"),
            log_dir: PathBuf::from("runs"),
            metrics_endpoint: None,
            seed: 123,
            hidden_sizes: vec![256, 256],
            reset_parameters: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggerMode {
    Offline,
    Online,
}

impl LoggerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Online => "online",
        }
    }
}

/// Fully resolved, read-only configuration of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(flatten)]
    pub hyperparameters: Hyperparameters,
    pub run: RunSettings,
    /// Top-level keys that matched no hyperparameter
    #[serde(flatten)]
    extra: toml::Table,
}

impl Settings {
    /// Compiled-in defaults merged with the overrides file named by
    /// [`SWEEP_CONFIG_VAR`], if any.
    pub fn resolve() -> Result<Self> {
        match std::env::var_os(SWEEP_CONFIG_VAR) {
            Some(path) => Self::from_file(Path::new(&path)),
            None => {
                let settings = Self::default();
                settings.validate()?;
                Ok(settings)
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Keys missing from `overrides` keep their defaults.
    pub fn from_toml(overrides: &str) -> Result<Self> {
        let settings: Self = toml::from_str(overrides)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let hp = &self.hyperparameters;

        if !self.extra.is_empty() {
            let keys: Vec<&str> = self.extra.keys().map(String::as_str).collect();
            return Err(Error::InvalidConfig(format!(
                "unknown hyperparameters: {}",
                keys.join(", ")
            )));
        }

        if hp.epochs == 0 {
            return Err(Error::InvalidConfig("epochs must be at least 1".into()));
        }

        let non_negative = [
            ("lr_speaker", hp.lr_speaker),
            ("lr_listener", hp.lr_listener),
            ("ps_weight", hp.ps_weight),
            ("pl_weight", hp.pl_weight),
            ("ce_weight", hp.ce_weight),
            ("speaker_lambda", hp.speaker_lambda),
        ];
        for (key, val) in non_negative {
            if !val.is_finite() || val < 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "{key} must be a non-negative number, got {val}"
                )));
            }
        }

        let finite = [
            ("speaker_ent_target", hp.speaker_ent_target),
            ("speaker_ent_bonus", hp.speaker_ent_bonus),
            ("listener_ent_bonus", hp.listener_ent_bonus),
        ];
        for (key, val) in finite {
            if !val.is_finite() {
                return Err(Error::InvalidConfig(format!(
                    "{key} must be a finite number, got {val}"
                )));
            }
        }

        if self.run.hidden_sizes.is_empty() || self.run.hidden_sizes.iter().any(|&s| s <= 0) {
            return Err(Error::InvalidConfig(
                "hidden_sizes needs at least one positive layer size".into(),
            ));
        }

        self.device()?;
        Ok(())
    }

    pub fn device(&self) -> Result<Device> {
        parse_device(&self.run.device)
    }

    pub fn logger_mode(&self) -> LoggerMode {
        if self.run.debugging {
            LoggerMode::Offline
        } else {
            LoggerMode::Online
        }
    }
}

pub fn parse_device(name: &str) -> Result<Device> {
    let name = name.trim().to_ascii_lowercase();
    match name.as_str() {
        "auto" => Ok(Device::cuda_if_available()),
        "cpu" => Ok(Device::Cpu),
        "mps" => Ok(Device::Mps),
        "cuda" => Ok(Device::Cuda(0)),
        _ => name
            .strip_prefix("cuda:")
            .and_then(|idx| idx.parse::<usize>().ok())
            .map(Device::Cuda)
            .ok_or_else(|| Error::UnknownDevice(name.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_the_sweep_defaults() {
        let settings = Settings::default();
        let hp = &settings.hyperparameters;

        assert_eq!(hp.lr_listener, 3e-4);
        assert_eq!(hp.epochs, 17);
        assert_eq!(hp.pl_weight, 0.01);
        assert_eq!(hp.ce_weight, 0.001);
        assert!(!hp.normalise_rewards);
        assert!(!hp.listener);
        assert_eq!(settings.run.project, "reinforce_mnist");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn partial_overrides_keep_other_defaults() {
        let settings = Settings::from_toml(
            r#"
            lr_listener = 0.001
            listener = true
            epochs = 2

            [run]
            device = "cpu"
            debugging = true
            "#,
        )
        .unwrap();

        assert_eq!(settings.hyperparameters.lr_listener, 0.001);
        assert!(settings.hyperparameters.listener);
        assert_eq!(settings.hyperparameters.epochs, 2);
        assert_eq!(settings.hyperparameters.lr_speaker, 3e-4);
        assert_eq!(settings.run.device, "cpu");
        assert_eq!(settings.run.seed, 123);
        assert_eq!(settings.logger_mode(), LoggerMode::Offline);
    }

    #[test]
    fn overrides_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ce_weight = 0.5\n[run]\ndevice = \"cpu\"").unwrap();

        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.hyperparameters.ce_weight, 0.5);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            Settings::from_toml("epochs = 0"),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            Settings::from_toml("lr_listener = -1.0"),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            Settings::from_toml("[run]\ndevice = \"tpu\""),
            Err(Error::UnknownDevice(_))
        ));
        assert!(matches!(
            Settings::from_toml("epochs = \"many\""),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn misspelled_keys_are_rejected() {
        let err = Settings::from_toml("lr_listner = 0.1").unwrap_err();
        match err {
            Error::InvalidConfig(msg) => assert!(msg.contains("lr_listner"), "{msg}"),
            other => panic!("unexpected error {other:?}"),
        }

        assert!(Settings::from_toml("[run]
devise = \"cpu\"").is_err());
    }

    #[test]
    fn non_finite_bonuses_are_rejected() {
        for key in ["listener_ent_bonus", "speaker_ent_bonus", "speaker_ent_target"] {
            for val in ["nan", "inf"] {
                assert!(
                    matches!(
                        Settings::from_toml(&format!("{key} = {val}")),
                        Err(Error::InvalidConfig(_))
                    ),
                    "{key} = {val}"
                );
            }
        }
        assert!(Settings::from_toml("listener_ent_bonus = 0.05").is_ok());
    }

    #[test]
    fn parses_device_names() {
        assert_eq!(parse_device("cpu").unwrap(), Device::Cpu);
        assert_eq!(parse_device("cuda:1").unwrap(), Device::Cuda(1));
        assert_eq!(parse_device("CUDA").unwrap(), Device::Cuda(0));
        assert!(parse_device("cuda:x").is_err());
    }

    #[test]
    fn online_unless_debugging() {
        assert_eq!(Settings::default().logger_mode(), LoggerMode::Online);
        assert_eq!(LoggerMode::Offline.as_str(), "offline");
    }
}
