use tch::{Kind, Tensor};

/// Everything the update needs from one forward pass and its rewards.
///
/// `log_probs`, `entropy` and `values` still carry their autograd graph.
pub struct Transition {
    pub answers: Tensor,
    pub log_probs: Tensor,
    pub entropy: Tensor,
    pub values: Tensor,
    pub rewards: Tensor,
}

/// All transitions gathered since the last update, concatenated along the sample axis
pub struct SampleSet {
    pub answers: Tensor,
    pub log_probs: Tensor,
    /// Mean entropy over the gathered steps
    pub entropy: Tensor,
    pub values: Tensor,
    pub rewards: Tensor,
}

#[derive(Default)]
pub struct ExperienceBuffer {
    transitions: Vec<Transition>,
    num_samples: i64,
}

impl ExperienceBuffer {
    pub fn submit_experience(&mut self, transition: Transition) {
        self.num_samples += transition.rewards.size().first().copied().unwrap_or(1);
        self.transitions.push(transition);
    }

    /// Samples (not steps) currently held
    pub fn len(&self) -> i64 {
        self.num_samples
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Empties the buffer, returning its contents as one set
    pub fn take_all(&mut self) -> Option<SampleSet> {
        if self.transitions.is_empty() {
            return None;
        }

        let transitions = std::mem::take(&mut self.transitions);
        self.num_samples = 0;

        let cat = |pick: fn(&Transition) -> &Tensor| {
            let parts: Vec<&Tensor> = transitions.iter().map(pick).collect();
            Tensor::cat(&parts, 0)
        };

        let entropies: Vec<&Tensor> = transitions.iter().map(|t| &t.entropy).collect();

        Some(SampleSet {
            answers: cat(|t| &t.answers),
            log_probs: cat(|t| &t.log_probs),
            entropy: Tensor::stack(&entropies, 0).mean(Kind::Float),
            values: cat(|t| &t.values),
            rewards: cat(|t| &t.rewards),
        })
    }

    pub fn clear(&mut self) {
        self.transitions.clear();
        self.num_samples = 0;
    }
}
