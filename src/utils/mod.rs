mod avg_tracker;
mod report;
pub(crate) mod running_stat;

pub use avg_tracker::AvgTracker;
pub use report::{Report, Reportable};

use tch::Tensor;

/// Mean of a tensor as an `f64`, read back to the host
pub(crate) fn mean_scalar(ten: &Tensor) -> f64 {
    ten.mean(tch::Kind::Float).double_value(&[])
}

/// Copies a 1-d float tensor to a host vector
pub(crate) fn to_host_vec(ten: &Tensor) -> Vec<f32> {
    let flat = ten
        .detach()
        .to_device(tch::Device::Cpu)
        .to_kind(tch::Kind::Float)
        .flatten(0, -1);
    let mut out = vec![0.0f32; flat.numel()];
    flat.copy_data(&mut out, out.len());
    out
}
