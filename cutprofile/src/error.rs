use thiserror::Error;
use tin::TinError;

#[derive(Error, Debug)]
pub enum SceneError {
    #[error("{0}")]
    Tin(#[from] TinError),

    #[error("unsupported frequency band {0} Hz")]
    Frequency(u32),

    #[error("invalid configuration: {0}")]
    Config(String),
}
