use crate::error::{Error, Result};
use tch::{Device, Kind, Tensor};

/// Samples drawn from the dataset per training step
pub const BATCH_SIZE: i64 = 64;
/// Samples seen by each participant, the batch is split in two
pub const HALF_BATCH: i64 = BATCH_SIZE / 2;
/// Width of messages and answers, enough for every digit and every sum of two digits
pub const NUM_CLASSES: i64 = 20;
pub const MAX_DIGIT: i64 = 9;

pub const REWARD_CORRECT: f64 = 1.0;
pub const REWARD_WRONG: f64 = -1.0;

/// One participant's private view of the batch
pub struct Half {
    pub images: Tensor,
    pub labels: Tensor,
}

/// Rewards `+1` where `answer` equals the sum of both labels and `-1` everywhere else.
///
/// The result has the shape of the labels and lives on `device`.
pub fn reward(
    labels_a: &Tensor,
    labels_b: &Tensor,
    answer: &Tensor,
    device: Device,
) -> Result<Tensor> {
    let shape = labels_a.size();
    for other in [labels_b, answer] {
        if other.size() != shape {
            return Err(Error::Shape {
                expected: shape,
                actual: other.size(),
            });
        }
    }

    let target = labels_a.to_device(device) + labels_b.to_device(device);
    let correct = answer.to_device(device).eq_tensor(&target);

    let rewards = Tensor::full(shape.as_slice(), REWARD_WRONG, (Kind::Float, device));
    Ok(rewards.masked_fill(&correct, REWARD_CORRECT))
}

/// One-hot encodes digit labels into `[N, NUM_CLASSES]` float messages.
pub fn encode_message(labels: &Tensor) -> Result<Tensor> {
    check_labels(labels)?;
    Ok(labels
        .to_kind(Kind::Int64)
        .one_hot(NUM_CLASSES)
        .to_kind(Kind::Float))
}

/// Splits a full batch along the sample axis into the two participants' halves.
pub fn split_batch(images: &Tensor, labels: &Tensor) -> Result<(Half, Half)> {
    for ten in [images, labels] {
        let size = ten.size();
        if size.first() != Some(&BATCH_SIZE) {
            let mut expected = size.clone();
            match expected.first_mut() {
                Some(first) => *first = BATCH_SIZE,
                None => expected.push(BATCH_SIZE),
            }
            return Err(Error::Shape {
                expected,
                actual: size,
            });
        }
    }

    let mut image_halves = images.split(HALF_BATCH, 0).into_iter();
    let mut label_halves = labels.split(HALF_BATCH, 0).into_iter();

    let mut next_half = || -> Option<Half> {
        Some(Half {
            images: image_halves.next()?,
            labels: label_halves.next()?,
        })
    };

    match (next_half(), next_half()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(Error::Shape {
            expected: vec![BATCH_SIZE],
            actual: labels.size(),
        }),
    }
}

fn check_labels(labels: &Tensor) -> Result<()> {
    if labels.numel() == 0 {
        return Ok(());
    }

    let labels = labels.to_kind(Kind::Int64);
    let min = labels.min().int64_value(&[]);
    let max = labels.max().int64_value(&[]);
    if min < 0 {
        return Err(Error::LabelOutOfRange(min));
    }
    if max > MAX_DIGIT {
        return Err(Error::LabelOutOfRange(max));
    }

    Ok(())
}
