use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use std::{
    fs::{self, File},
    io,
    path::Path,
};
use tch::{Device, Kind, Tensor, data::Iter2, vision::mnist};
use tracing::info;

const MIRROR: &str = "https://ossci-datasets.s3.amazonaws.com/mnist";

/// Files `tch::vision::mnist::load_dir` reads, all four must be present
const FILES: [&str; 4] = [
    "train-images-idx3-ubyte",
    "train-labels-idx1-ubyte",
    "t10k-images-idx3-ubyte",
    "t10k-labels-idx1-ubyte",
];

/// Labeled digit images, `[N, 784]` floats in `[0, 1]` and `[N]` int64 labels.
pub struct MnistData {
    images: Tensor,
    labels: Tensor,
}

impl MnistData {
    /// The 60,000 image training split, downloaded into `dir` first if it isn't there.
    pub fn load_or_download(dir: &Path) -> Result<Self> {
        download(dir)?;

        let dataset = mnist::load_dir(dir)?;
        info!(
            "Loaded {} training images from {}",
            dataset.train_labels.size()[0],
            dir.display()
        );

        Self::from_tensors(dataset.train_images, dataset.train_labels)
    }

    pub fn from_tensors(images: Tensor, labels: Tensor) -> Result<Self> {
        let num_images = images.size().first().copied().unwrap_or(0);
        if labels.size() != [num_images] {
            return Err(Error::Shape {
                expected: vec![num_images],
                actual: labels.size(),
            });
        }

        Ok(Self {
            images: images.to_kind(Kind::Float).flatten(1, -1),
            labels: labels.to_kind(Kind::Int64),
        })
    }

    pub fn len(&self) -> i64 {
        self.labels.size()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Full batches per pass, the last incomplete batch is dropped
    pub fn num_batches(&self, batch_size: i64) -> i64 {
        self.len() / batch_size
    }

    /// One shuffled pass over the data in `(images, labels)` batches on `device`.
    pub fn batches(&self, batch_size: i64, device: Device) -> Iter2 {
        let mut iter = Iter2::new(&self.images, &self.labels, batch_size);
        iter.shuffle().to_device(device);
        iter
    }
}

/// Fetches and unpacks any missing MNIST file into `dir`
pub fn download(dir: &Path) -> Result<()> {
    let missing: Vec<&str> = FILES
        .into_iter()
        .filter(|name| !dir.join(name).exists())
        .collect();
    if missing.is_empty() {
        return Ok(());
    }

    fs::create_dir_all(dir)?;
    let client = reqwest::blocking::Client::new();

    for name in missing {
        let url = format!("{MIRROR}/{name}.gz");
        info!("Downloading {url}");

        let response = client.get(&url).send()?.error_for_status()?;
        let bytes = response.bytes()?;

        // unpacked under a temporary name, renamed once complete
        let target = dir.join(name);
        let partial = target.with_extension("partial");
        let mut out = File::create(&partial)?;
        io::copy(&mut GzDecoder::new(bytes.as_ref()), &mut out)?;
        fs::rename(&partial, &target)?;
    }

    Ok(())
}
