use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to parse config overrides: {0}")]
    Config(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("unknown device {0:?}, expected one of cpu, cuda, cuda:N, mps, auto")]
    UnknownDevice(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("libtorch error: {0}")]
    Tch(#[from] tch::TchError),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    Shape { expected: Vec<i64>, actual: Vec<i64> },

    #[error("label {0} is outside the digit range 0..=9")]
    LabelOutOfRange(i64),

    #[error("dataset holds fewer samples than one batch of {0}")]
    EmptyDataset(i64),

    #[error("experience buffer is empty, call add_to_buffer before train")]
    EmptyBuffer,

    #[error("no pending forward pass to pair with the submitted reward")]
    NoPendingStep,

    #[error("online metric logging needs `metrics_endpoint` to be set")]
    MissingEndpoint,
}

pub type Result<T> = std::result::Result<T, Error>;
