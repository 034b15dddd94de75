use crate::{
    error::{Error, Result},
    game::NUM_CLASSES,
};
use tch::{
    Device, Kind, Tensor,
    nn::{self, LinearConfig, ModuleT},
};

/// Flattened MNIST image width
pub const IMAGE_SIZE: i64 = 28 * 28;

pub struct ListenerOutput {
    /// `[N, NUM_CLASSES]` answer probabilities
    pub probs: Tensor,
    /// `[N]` baseline estimates of the reward
    pub values: Tensor,
}

/// Policy and baseline for the listener.
///
/// Parameters live in two stores so that the message pathway can be trained
/// (or frozen) on its own: `message_store` holds the message tower, `main_store`
/// holds the image tower and both heads.
pub struct ListenerNet {
    image_tower: nn::SequentialT,
    message_tower: nn::SequentialT,
    policy_head: nn::Linear,
    value_head: nn::Linear,
    pub main_store: nn::VarStore,
    pub message_store: nn::VarStore,
}

impl ListenerNet {
    /// Min probability that an answer will be given
    pub const ANSWER_MIN_PROB: f64 = 1e-11;

    pub fn new(layer_sizes: &[i64], device: Device) -> Result<Self> {
        if layer_sizes.is_empty() || layer_sizes.iter().any(|&size| size <= 0) {
            return Err(Error::InvalidConfig(format!(
                "listener needs at least one positive layer size, got {layer_sizes:?}"
            )));
        }

        let main_store = nn::VarStore::new(device);
        let message_store = nn::VarStore::new(device);

        let image_tower = mlp(&main_store.root() / "image", IMAGE_SIZE, layer_sizes);
        let message_tower = mlp(&message_store.root() / "message", NUM_CLASSES, layer_sizes);

        let joint_size = layer_sizes[layer_sizes.len() - 1] * 2;
        let policy_head = nn::linear(
            &main_store.root() / "policy",
            joint_size,
            NUM_CLASSES,
            LinearConfig::default(),
        );
        let value_head = nn::linear(
            &main_store.root() / "value",
            joint_size,
            1,
            LinearConfig::default(),
        );

        Ok(Self {
            image_tower,
            message_tower,
            policy_head,
            value_head,
            main_store,
            message_store,
        })
    }

    pub fn forward(&self, image: &Tensor, message: &Tensor, train: bool) -> ListenerOutput {
        let image_features = self.image_tower.forward_t(image, train);
        let message_features = self.message_tower.forward_t(message, train);
        let joint = Tensor::cat(&[image_features, message_features], -1);

        let probs = joint
            .apply(&self.policy_head)
            .softmax(-1, Kind::Float)
            .clamp(Self::ANSWER_MIN_PROB, 1.0);
        let values = joint.apply(&self.value_head).squeeze_dim(-1);

        ListenerOutput { probs, values }
    }
}

fn mlp(path: nn::Path, input_size: i64, layer_sizes: &[i64]) -> nn::SequentialT {
    let config = LinearConfig::default();

    let mut seq = nn::seq_t()
        .add(nn::linear(&path / 0, input_size, layer_sizes[0], config))
        .add_fn(|xs| xs.relu());

    let mut prev_layer_size = layer_sizes[0];
    for (i, layer_size) in layer_sizes.iter().skip(1).copied().enumerate() {
        seq = seq
            .add(nn::linear(
                &path / (i + 1),
                prev_layer_size,
                layer_size,
                config,
            ))
            .add_fn(|xs| xs.relu());
        prev_layer_size = layer_size;
    }

    seq
}
