//! Metric sinks. Each training step hands one [`Report`] to the run's logger.

use crate::{
    config::{LoggerMode, Settings},
    error::{Error, Result},
    utils::Report,
};
use serde::Serialize;
use std::{
    fs::{self, File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::info;

pub trait MetricLogger {
    /// Called once before the first step, with the configuration the run uses
    fn start(&mut self, _settings: &Settings) -> Result<()> {
        Ok(())
    }

    fn log(&mut self, step: u64, metrics: &Report) -> Result<()>;

    /// Called once after the last step
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Serialize)]
struct RunEvent<'a> {
    project: &'a str,
    run_id: &'a str,
    ts_ms: u64,
    config: &'a Settings,
}

#[derive(Serialize)]
struct MetricEvent<'a> {
    project: &'a str,
    run_id: &'a str,
    step: u64,
    ts_ms: u64,
    metrics: &'a Report,
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

pub fn new_run_id() -> String {
    format!("{:08x}", fastrand::u32(..))
}

/// Opens the sink the run's mode asks for
pub fn from_settings(settings: &Settings, run_id: &str) -> Result<Box<dyn MetricLogger>> {
    let project = &settings.run.project;

    match settings.logger_mode() {
        LoggerMode::Offline => {
            let path = settings
                .run
                .log_dir
                .join(project)
                .join(format!("{run_id}.ndjson"));
            info!("Logging metrics offline to {}", path.display());
            Ok(Box::new(NdjsonLogger::create(path, project, run_id)?))
        }
        LoggerMode::Online => {
            let endpoint = settings
                .run
                .metrics_endpoint
                .as_deref()
                .ok_or(Error::MissingEndpoint)?;
            info!("Logging metrics online to {endpoint}");
            Ok(Box::new(HttpLogger::new(endpoint, project, run_id)))
        }
    }
}

/// Append-only NDJSON file: the run's configuration, then one object per step
pub struct NdjsonLogger {
    w: BufWriter<File>,
    path: PathBuf,
    project: String,
    run_id: String,
}

impl NdjsonLogger {
    pub fn create(
        path: impl Into<PathBuf>,
        project: impl Into<String>,
        run_id: impl Into<String>,
    ) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let f = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            w: BufWriter::new(f),
            path,
            project: project.into(),
            run_id: run_id.into(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line<T: Serialize>(&mut self, event: &T) -> Result<()> {
        let mut buf = serde_json::to_vec(event)?;
        buf.push(b'\n');
        self.w.write_all(&buf)?;
        Ok(())
    }
}

impl MetricLogger for NdjsonLogger {
    fn start(&mut self, settings: &Settings) -> Result<()> {
        let event = RunEvent {
            project: &self.project,
            run_id: &self.run_id,
            ts_ms: now_ms(),
            config: settings,
        };
        self.write_line(&event)
    }

    fn log(&mut self, step: u64, metrics: &Report) -> Result<()> {
        let event = MetricEvent {
            project: &self.project,
            run_id: &self.run_id,
            step,
            ts_ms: now_ms(),
            metrics,
        };
        self.write_line(&event)
    }

    fn finish(&mut self) -> Result<()> {
        self.w.flush()?;
        Ok(())
    }
}

/// POSTs the run's configuration, then every step, as JSON to a collector endpoint
pub struct HttpLogger {
    client: reqwest::blocking::Client,
    endpoint: String,
    project: String,
    run_id: String,
}

impl HttpLogger {
    pub fn new(
        endpoint: impl Into<String>,
        project: impl Into<String>,
        run_id: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            endpoint: endpoint.into(),
            project: project.into(),
            run_id: run_id.into(),
        }
    }

    fn post<T: Serialize>(&self, event: &T) -> Result<()> {
        self.client
            .post(&self.endpoint)
            .json(event)
            .send()?
            .error_for_status()?;
        Ok(())
    }
}

impl MetricLogger for HttpLogger {
    fn start(&mut self, settings: &Settings) -> Result<()> {
        self.post(&RunEvent {
            project: &self.project,
            run_id: &self.run_id,
            ts_ms: now_ms(),
            config: settings,
        })
    }

    fn log(&mut self, step: u64, metrics: &Report) -> Result<()> {
        self.post(&MetricEvent {
            project: &self.project,
            run_id: &self.run_id,
            step,
            ts_ms: now_ms(),
            metrics,
        })
    }
}

/// Keeps every logged step in memory
#[derive(Debug, Default)]
pub struct MemoryLogger {
    /// Configuration of each run started on this logger
    pub runs: Vec<Settings>,
    pub steps: Vec<(u64, Report)>,
}

impl MetricLogger for MemoryLogger {
    fn start(&mut self, settings: &Settings) -> Result<()> {
        self.runs.push(settings.clone());
        Ok(())
    }

    fn log(&mut self, step: u64, metrics: &Report) -> Result<()> {
        self.steps.push((step, metrics.clone()));
        Ok(())
    }
}

impl<L: MetricLogger + ?Sized> MetricLogger for &mut L {
    fn start(&mut self, settings: &Settings) -> Result<()> {
        (**self).start(settings)
    }

    fn log(&mut self, step: u64, metrics: &Report) -> Result<()> {
        (**self).log(step, metrics)
    }

    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }
}

impl<L: MetricLogger + ?Sized> MetricLogger for Box<L> {
    fn start(&mut self, settings: &Settings) -> Result<()> {
        (**self).start(settings)
    }

    fn log(&mut self, step: u64, metrics: &Report) -> Result<()> {
        (**self).log(step, metrics)
    }

    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }
}
