pub mod config;
pub mod exp_buf;
pub mod net;

use crate::{
    agent::{
        config::PolicyGradientConfig,
        exp_buf::{ExperienceBuffer, SampleSet, Transition},
        net::ListenerNet,
    },
    error::{Error, Result},
    utils::{Report, running_stat::WelfordRunningStat, to_host_vec},
};
use tch::{
    Kind, Reduction, Tensor,
    nn::{self, OptimizerConfig},
};
use tracing::debug;

/// A learner that can play the listener's side of the game.
///
/// The training loop only talks to this interface, so any algorithm (or a test
/// double) can be dropped in.
pub trait Agent {
    /// Answers for a batch of images and the messages that go with them
    fn forward(&mut self, image: &Tensor, message: &Tensor) -> Result<Tensor>;

    /// Pairs the answers of the last `forward` with the rewards they earned
    fn add_to_buffer(&mut self, answer: &Tensor, reward: &Tensor) -> Result<()>;

    /// Runs one learning step over the buffer, returning its metrics.
    /// The metrics always include `loss` and `ent`.
    fn train(&mut self) -> Result<Report>;

    /// Discards buffered experience, and learned parameters if the agent is set up to
    fn reset(&mut self) -> Result<()>;
}

struct PendingStep {
    answers: Tensor,
    log_probs: Tensor,
    entropy: Tensor,
    values: Tensor,
}

/// REINFORCE listener with a learned baseline
pub struct PolicyGradient {
    config: PolicyGradientConfig,
    net: ListenerNet,
    main_optimizer: nn::Optimizer,
    message_optimizer: nn::Optimizer,
    reward_stat: WelfordRunningStat,
    pending: Option<PendingStep>,
    buffer: ExperienceBuffer,
    cumulative_model_updates: u64,
}

impl PolicyGradient {
    pub fn new(config: PolicyGradientConfig) -> Result<Self> {
        let (net, main_optimizer, message_optimizer) = Self::build(&config)?;

        Ok(Self {
            config,
            net,
            main_optimizer,
            message_optimizer,
            reward_stat: WelfordRunningStat::default(),
            pending: None,
            buffer: ExperienceBuffer::default(),
            cumulative_model_updates: 0,
        })
    }

    fn build(
        config: &PolicyGradientConfig,
    ) -> Result<(ListenerNet, nn::Optimizer, nn::Optimizer)> {
        let mut net = ListenerNet::new(&config.layer_sizes, config.device)?;
        if !config.listener {
            net.message_store.freeze();
        }

        let main_optimizer = nn::Adam::default().build(&net.main_store, config.lr_no_m)?;
        let message_optimizer = nn::Adam::default().build(&net.message_store, config.lr)?;

        Ok((net, main_optimizer, message_optimizer))
    }

    pub fn config(&self) -> &PolicyGradientConfig {
        &self.config
    }

    pub fn cumulative_model_updates(&self) -> u64 {
        self.cumulative_model_updates
    }

    pub fn buffered_samples(&self) -> i64 {
        self.buffer.len()
    }

    pub fn net(&self) -> &ListenerNet {
        &self.net
    }

    fn check_rows(&self, ten: &Tensor) -> Result<()> {
        let size = ten.size();
        if size.first() != Some(&self.config.batch_size) {
            let mut expected = size.clone();
            match expected.first_mut() {
                Some(first) => *first = self.config.batch_size,
                None => expected.push(self.config.batch_size),
            }
            return Err(Error::Shape {
                expected,
                actual: size,
            });
        }
        Ok(())
    }

    fn losses(&mut self, set: &SampleSet) -> (Tensor, Report) {
        let device = self.config.device;
        let raw_rewards = set.rewards.to_device(device).to_kind(Kind::Float);

        let rewards = if self.config.normalise_rewards {
            self.reward_stat.increment(&to_host_vec(&raw_rewards));
            &raw_rewards / self.reward_stat.get_std() as f64
        } else {
            raw_rewards.shallow_clone()
        };

        let zero = || Tensor::scalar_tensor(0.0, (Kind::Float, device));

        let (advantages, loss_baseline) = if self.config.baseline {
            (
                &rewards - set.values.detach(),
                set.values.mse_loss(&rewards, Reduction::Mean),
            )
        } else {
            (rewards.shallow_clone(), zero())
        };

        let loss_pg = -(advantages * &set.log_probs).mean(Kind::Float);

        // Self-imitation on the answers that were right
        let rewarded = raw_rewards.gt(0.0).to_kind(Kind::Float);
        let num_rewarded = rewarded.sum(Kind::Float).clamp_min(1.0);
        let loss_ce = -(&set.log_probs * &rewarded).sum(Kind::Float) / num_rewarded;

        let loss = &loss_pg + &loss_baseline * self.config.pl_weight
            + &loss_ce * self.config.ce_weight
            - &set.entropy * self.config.ent_bonus;

        let mut metrics = Report::default();
        metrics["loss"] = loss.double_value(&[]).into();
        metrics["ent"] = set.entropy.double_value(&[]).into();
        metrics["loss_pg"] = loss_pg.double_value(&[]).into();
        metrics["loss_baseline"] = loss_baseline.double_value(&[]).into();
        metrics["loss_ce"] = loss_ce.double_value(&[]).into();
        metrics["baseline"] = set.values.mean(Kind::Float).double_value(&[]).into();
        if self.config.normalise_rewards {
            metrics["reward_std"] = self.reward_stat.get_std().into();
        }

        (loss, metrics)
    }
}

impl Agent for PolicyGradient {
    fn forward(&mut self, image: &Tensor, message: &Tensor) -> Result<Tensor> {
        self.check_rows(image)?;
        self.check_rows(message)?;

        let device = self.config.device;
        let image = image.to_device(device).to_kind(Kind::Float).flatten(1, -1);
        let message = message.to_device(device).to_kind(Kind::Float);

        let out = self.net.forward(&image, &message, true);

        let answers = out.probs.multinomial(1, true).squeeze_dim(-1);

        let log_probs = out.probs.log();
        let answer_log_probs = log_probs
            .gather(-1, &answers.unsqueeze(-1), false)
            .squeeze_dim(-1);
        let entropy = -(&log_probs * &out.probs)
            .sum_dim_intlist([-1i64].as_slice(), false, Kind::Float)
            .mean(Kind::Float);

        if self.pending.is_some() {
            debug!("forward called again before add_to_buffer, dropping the earlier answers");
        }

        self.pending = Some(PendingStep {
            answers: answers.shallow_clone(),
            log_probs: answer_log_probs,
            entropy,
            values: out.values,
        });

        Ok(answers)
    }

    fn add_to_buffer(&mut self, answer: &Tensor, reward: &Tensor) -> Result<()> {
        let pending = self.pending.take().ok_or(Error::NoPendingStep)?;

        for ten in [answer, reward] {
            if ten.size() != pending.answers.size() {
                return Err(Error::Shape {
                    expected: pending.answers.size(),
                    actual: ten.size(),
                });
            }
        }

        self.buffer.submit_experience(Transition {
            answers: answer.to_device(self.config.device),
            log_probs: pending.log_probs,
            entropy: pending.entropy,
            values: pending.values,
            rewards: reward.to_device(self.config.device).to_kind(Kind::Float),
        });

        Ok(())
    }

    fn train(&mut self) -> Result<Report> {
        let set = self.buffer.take_all().ok_or(Error::EmptyBuffer)?;
        let (loss, mut metrics) = self.losses(&set);

        self.main_optimizer.zero_grad();
        if self.config.listener {
            self.message_optimizer.zero_grad();
        }

        loss.backward();

        self.main_optimizer.step();
        if self.config.listener {
            self.message_optimizer.step();
        }

        self.cumulative_model_updates += 1;
        metrics["updates"] = self.cumulative_model_updates.into();

        Ok(metrics)
    }

    fn reset(&mut self) -> Result<()> {
        self.pending = None;
        self.buffer.clear();
        self.reward_stat.reset();

        if self.config.reset_parameters {
            debug!("Reinitializing listener parameters");
            let (net, main_optimizer, message_optimizer) = Self::build(&self.config)?;
            self.net = net;
            self.main_optimizer = main_optimizer;
            self.message_optimizer = message_optimizer;
            self.cumulative_model_updates = 0;
        }

        Ok(())
    }
}
