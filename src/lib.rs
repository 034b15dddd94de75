pub mod agent;
pub mod config;
pub mod data;
pub mod error;
pub mod game;
pub mod logger;
pub mod utils;

pub use agent::{Agent, PolicyGradient, config::PolicyGradientConfig};
pub use config::{Hyperparameters, LoggerMode, RunSettings, Settings};
pub use data::MnistData;
pub use error::{Error, Result};
pub use logger::{MemoryLogger, MetricLogger};
pub use tch;
pub use utils::{AvgTracker, Report, Reportable};

use game::{BATCH_SIZE, encode_message, reward, split_batch};
use tch::{Device, Tensor};
use tracing::info;
use utils::mean_scalar;

/// A progress line is printed every this many batches
pub const PROGRESS_INTERVAL: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Finished,
}

#[derive(Debug, Clone, Default)]
pub struct TrainSummary {
    pub epochs: u32,
    pub total_steps: u64,
    /// Mean reward of the final batch of the run
    pub last_mean_reward: f64,
    /// Mean reward of the final batch of each epoch
    pub epoch_last_rewards: Vec<f64>,
    /// Mean reward over every batch of each epoch
    pub epoch_avg_rewards: Vec<f64>,
}

/// Everything one training run needs, passed around explicitly.
pub struct RunContext<A: Agent, L: MetricLogger> {
    pub settings: Settings,
    pub device: Device,
    pub agent: A,
    pub logger: L,
    state: RunState,
    total_steps: u64,
}

impl RunContext<PolicyGradient, Box<dyn MetricLogger>> {
    /// Seeds libtorch, then builds the listener and the metric sink
    pub fn from_settings(settings: Settings, run_id: &str) -> Result<Self> {
        settings.validate()?;
        let device = settings.device()?;

        tch::manual_seed(settings.run.seed);
        fastrand::seed(settings.run.seed as u64);

        info!("Creating listener on {device:?}...");
        let agent = PolicyGradient::new(PolicyGradientConfig::listener(&settings, device))?;

        info!("Creating metric logger...");
        let logger = logger::from_settings(&settings, run_id)?;

        Ok(Self::new(settings, device, agent, logger))
    }
}

impl<A: Agent, L: MetricLogger> RunContext<A, L> {
    pub fn new(settings: Settings, device: Device, agent: A, logger: L) -> Self {
        Self {
            settings,
            device,
            agent,
            logger,
            state: RunState::Idle,
            total_steps: 0,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Steps taken since the current run started
    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }

    /// Plays one batch of the game: split, message, answer, reward, learn, log.
    /// Returns the metrics that were logged.
    pub fn step(&mut self, images: &Tensor, labels: &Tensor) -> Result<Report> {
        let images = images.to_device(self.device);
        let labels = labels.to_device(self.device);

        let (first, second) = split_batch(&images, &labels)?;
        let message = encode_message(&first.labels)?;

        let answer = self.agent.forward(&second.images, &message)?;
        let rewards = reward(&first.labels, &second.labels, &answer, self.device)?;
        self.agent.add_to_buffer(&answer, &rewards)?;

        let mut metrics = self.agent.train()?;
        metrics["reward"] = mean_scalar(&rewards).into();

        self.logger.log(self.total_steps, &metrics)?;
        self.total_steps += 1;

        Ok(metrics)
    }

    /// Runs `epochs` shuffled passes over `data`.
    pub fn train(&mut self, data: &MnistData, epochs: u32) -> Result<TrainSummary> {
        if data.num_batches(BATCH_SIZE) == 0 {
            return Err(Error::EmptyDataset(BATCH_SIZE));
        }

        self.agent.reset()?;
        self.logger.start(&self.settings)?;
        self.state = RunState::Running;
        self.total_steps = 0;

        let mut summary = TrainSummary {
            epochs,
            ..Default::default()
        };

        for epoch in 0..epochs {
            let mut epoch_reward = AvgTracker::default();
            let mut last_reward = f64::NAN;

            let batches = data.batches(BATCH_SIZE, self.device);
            for (batch_idx, (images, labels)) in batches.enumerate() {
                let metrics = self.step(&images, &labels)?;
                last_reward = metrics.get("reward").unwrap_or(f64::NAN);
                epoch_reward += last_reward;

                if batch_idx % PROGRESS_INTERVAL == 0 {
                    info!("{batch_idx}: mean reward {last_reward:.4}");
                }
            }

            info!(
                "Epoch {epoch}: last batch mean reward {last_reward:.4}, epoch average {:.4}",
                epoch_reward.get()
            );

            summary.epoch_last_rewards.push(last_reward);
            summary.epoch_avg_rewards.push(epoch_reward.get());
            summary.last_mean_reward = last_reward;
        }

        self.logger.finish()?;
        self.state = RunState::Finished;
        summary.total_steps = self.total_steps;

        Ok(summary)
    }
}
