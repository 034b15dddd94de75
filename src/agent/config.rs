use crate::{config::Settings, game::HALF_BATCH};
use tch::Device;

#[derive(Debug, Clone)]
pub struct PolicyGradientConfig {
    pub layer_sizes: Vec<i64>,
    /// Learning rate of the message pathway
    pub lr: f64,
    /// Learning rate of everything that doesn't see the message
    pub lr_no_m: f64,
    /// Train the message pathway, it stays frozen otherwise
    pub listener: bool,
    /// Weight of the baseline prediction loss
    pub pl_weight: f64,
    /// Entropy bonus coefficient
    pub ent_bonus: f64,
    /// Weight of the cross-entropy on rewarded answers
    pub ce_weight: f64,
    /// Divide rewards by their running standard deviation
    pub normalise_rewards: bool,
    /// Subtract the learned baseline from rewards
    pub baseline: bool,
    /// Rows expected from every forward pass
    pub batch_size: i64,
    /// Reinitialize weights and optimizers on reset
    pub reset_parameters: bool,
    pub device: Device,
}

impl Default for PolicyGradientConfig {
    fn default() -> Self {
        Self {
            layer_sizes: vec![256, 256],
            lr: 3e-4,
            lr_no_m: 3e-4,
            listener: false,
            pl_weight: 0.01,
            ent_bonus: 0.0,
            ce_weight: 0.001,
            normalise_rewards: false,
            baseline: true,
            batch_size: HALF_BATCH,
            reset_parameters: false,
            device: Device::cuda_if_available(),
        }
    }
}

impl PolicyGradientConfig {
    /// The listener's view of a resolved run configuration
    pub fn listener(settings: &Settings, device: Device) -> Self {
        let hp = &settings.hyperparameters;

        Self {
            layer_sizes: settings.run.hidden_sizes.clone(),
            lr: hp.lr_listener,
            lr_no_m: hp.lr_listener,
            listener: hp.listener,
            pl_weight: hp.pl_weight,
            ent_bonus: hp.listener_ent_bonus,
            ce_weight: hp.ce_weight,
            normalise_rewards: hp.normalise_rewards,
            reset_parameters: settings.run.reset_parameters,
            device,
            ..Default::default()
        }
    }
}
