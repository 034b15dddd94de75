use mnist_listener::{
    Agent, Error, MemoryLogger, MnistData, PolicyGradient, PolicyGradientConfig, Report,
    Result, RunContext, RunState, Settings,
    game::{BATCH_SIZE, HALF_BATCH, NUM_CLASSES},
    tch::{Device, Kind, Tensor},
};

/// Images carry their own label in the first pixel, so stubs can read it back.
fn labeled_dataset(labels: &[i64]) -> MnistData {
    let n = labels.len() as i64;
    let labels = Tensor::from_slice(labels);
    let images = Tensor::zeros([n, 784], (Kind::Float, Device::Cpu));
    let mut first_pixel = images.narrow(1, 0, 1);
    first_pixel.copy_(&labels.to_kind(Kind::Float).unsqueeze(1));
    MnistData::from_tensors(images, labels).unwrap()
}

fn digits(n: usize, offset: i64) -> Vec<i64> {
    (0..n as i64).map(|i| (i + offset) % 10).collect()
}

#[derive(Default)]
struct Calls {
    resets: usize,
    forwards: usize,
    buffered: usize,
    trains: usize,
}

/// Answers with the true sum: label A from the message, label B from the image.
#[derive(Default)]
struct OracleAgent {
    calls: Calls,
}

impl Agent for OracleAgent {
    fn forward(&mut self, image: &Tensor, message: &Tensor) -> Result<Tensor> {
        assert_eq!(image.size(), vec![HALF_BATCH, 784]);
        assert_eq!(message.size(), vec![HALF_BATCH, NUM_CLASSES]);
        self.calls.forwards += 1;

        let label_a = message.argmax(1, false);
        let label_b = image.select(1, 0).round().to_kind(Kind::Int64);
        Ok(label_a + label_b)
    }

    fn add_to_buffer(&mut self, answer: &Tensor, reward: &Tensor) -> Result<()> {
        assert_eq!(answer.size(), reward.size());
        self.calls.buffered += 1;
        Ok(())
    }

    fn train(&mut self) -> Result<Report> {
        self.calls.trains += 1;
        let mut metrics = Report::default();
        metrics["loss"] = 0.0f64.into();
        metrics["ent"] = 0.0f64.into();
        Ok(metrics)
    }

    fn reset(&mut self) -> Result<()> {
        self.calls.resets += 1;
        Ok(())
    }
}

/// Always answers zero
struct ZeroAgent;

impl Agent for ZeroAgent {
    fn forward(&mut self, image: &Tensor, _message: &Tensor) -> Result<Tensor> {
        Ok(Tensor::zeros([image.size()[0]], (Kind::Int64, image.device())))
    }

    fn add_to_buffer(&mut self, _answer: &Tensor, _reward: &Tensor) -> Result<()> {
        Ok(())
    }

    fn train(&mut self) -> Result<Report> {
        let mut metrics = Report::default();
        metrics["loss"] = 1.0f64.into();
        metrics["ent"] = 0.0f64.into();
        Ok(metrics)
    }

    fn reset(&mut self) -> Result<()> {
        Ok(())
    }
}

fn context<A: Agent>(agent: A) -> RunContext<A, MemoryLogger> {
    RunContext::new(
        Settings::default(),
        Device::Cpu,
        agent,
        MemoryLogger::default(),
    )
}

#[test]
fn oracle_earns_full_reward() {
    let data = labeled_dataset(&digits(BATCH_SIZE as usize, 0));
    let mut ctx = context(OracleAgent::default());
    assert_eq!(ctx.state(), RunState::Idle);

    let summary = ctx.train(&data, 1).unwrap();

    assert_eq!(ctx.state(), RunState::Finished);
    assert_eq!(summary.total_steps, 1);
    assert_eq!(summary.last_mean_reward, 1.0);
    assert_eq!(summary.epoch_last_rewards, vec![1.0]);

    assert_eq!(ctx.logger.steps.len(), 1);
    let (step, metrics) = &ctx.logger.steps[0];
    assert_eq!(*step, 0);
    assert_eq!(metrics.get("reward"), Some(1.0));
    assert!(metrics.contains_key("loss"));
    assert!(metrics.contains_key("ent"));
}

#[test]
fn wrong_answers_earn_minus_one() {
    // labels 1..=9 only, so no sum is ever zero
    let labels: Vec<i64> = (0..BATCH_SIZE).map(|i| 1 + i % 9).collect();
    let data = labeled_dataset(&labels);
    let mut ctx = context(ZeroAgent);

    let summary = ctx.train(&data, 1).unwrap();
    assert_eq!(summary.last_mean_reward, -1.0);
    assert_eq!(ctx.logger.steps[0].1.get("reward"), Some(-1.0));
}

#[test]
fn agent_protocol_is_followed_per_batch() {
    let data = labeled_dataset(&digits(BATCH_SIZE as usize * 3 + 17, 4));
    let mut ctx = context(OracleAgent::default());

    let summary = ctx.train(&data, 2).unwrap();

    // three full batches per epoch, the 17 leftover samples are dropped
    assert_eq!(summary.total_steps, 6);
    assert_eq!(summary.epoch_last_rewards.len(), 2);
    assert_eq!(summary.epoch_avg_rewards, vec![1.0, 1.0]);

    let calls = &ctx.agent.calls;
    assert_eq!(calls.resets, 1);
    assert_eq!(calls.forwards, 6);
    assert_eq!(calls.buffered, 6);
    assert_eq!(calls.trains, 6);

    let steps: Vec<u64> = ctx.logger.steps.iter().map(|(s, _)| *s).collect();
    assert_eq!(steps, (0..6).collect::<Vec<_>>());
}

#[test]
fn policy_gradient_logs_bounded_finite_rewards() {
    let data = labeled_dataset(&digits(BATCH_SIZE as usize * 2, 7));
    let config = PolicyGradientConfig {
        layer_sizes: vec![32],
        device: Device::Cpu,
        ..Default::default()
    };
    let mut ctx = context(PolicyGradient::new(config).unwrap());

    let summary = ctx.train(&data, 2).unwrap();
    assert_eq!(summary.total_steps, 4);

    for (_, metrics) in &ctx.logger.steps {
        let reward = metrics.get("reward").unwrap();
        assert!(reward.is_finite());
        assert!((-1.0..=1.0).contains(&reward));

        for key in ["loss", "ent"] {
            assert!(metrics.get(key).unwrap().is_finite(), "{key}");
        }
    }
}

#[test]
fn too_small_dataset_is_rejected() {
    let data = labeled_dataset(&digits(40, 0));
    let mut ctx = context(OracleAgent::default());

    assert!(matches!(ctx.train(&data, 1), Err(Error::EmptyDataset(64))));
    assert_eq!(ctx.agent.calls.resets, 0);
    assert_eq!(ctx.state(), RunState::Idle);
    assert!(ctx.logger.runs.is_empty());
}

#[test]
fn each_run_records_its_config_and_counts_its_own_steps() {
    let data = labeled_dataset(&digits(BATCH_SIZE as usize * 2, 3));
    let mut settings = Settings::default();
    settings.hyperparameters.lr_listener = 0.05;
    let mut ctx = RunContext::new(
        settings.clone(),
        Device::Cpu,
        OracleAgent::default(),
        MemoryLogger::default(),
    );

    let first = ctx.train(&data, 1).unwrap();
    assert_eq!(first.total_steps, 2);
    assert_eq!(ctx.logger.runs, vec![settings.clone()]);

    let second = ctx.train(&data, 1).unwrap();
    assert_eq!(second.total_steps, 2);
    assert_eq!(ctx.total_steps(), 2);
    assert_eq!(ctx.state(), RunState::Finished);
    assert_eq!(ctx.logger.runs.len(), 2);
    assert_eq!(ctx.agent.calls.resets, 2);

    let steps: Vec<u64> = ctx.logger.steps.iter().map(|(s, _)| *s).collect();
    assert_eq!(steps, vec![0, 1, 0, 1]);
}

#[test]
fn single_step_matches_reward_rule() {
    let mut ctx = context(ZeroAgent);

    // first half labels all 0, second half labels all 0: the zero answer is right
    let images = Tensor::zeros([BATCH_SIZE, 784], (Kind::Float, Device::Cpu));
    let labels = Tensor::zeros([BATCH_SIZE], (Kind::Int64, Device::Cpu));
    let metrics = ctx.step(&images, &labels).unwrap();
    assert_eq!(metrics.get("reward"), Some(1.0));

    let wrong = Tensor::ones([BATCH_SIZE], (Kind::Int64, Device::Cpu));
    let metrics = ctx.step(&images, &wrong).unwrap();
    assert_eq!(metrics.get("reward"), Some(-1.0));
    assert_eq!(ctx.total_steps(), 2);
}
