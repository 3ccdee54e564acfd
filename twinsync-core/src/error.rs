use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Config Error - {0}")]
    Config(String),

    #[error("Watermark Store Error - {0}")]
    WatermarkStore(String),

    #[error("Change Provider Error - {0}")]
    Provider(String),

    #[error("Sink Error - {0}")]
    Sink(String),

    #[error("Stalled - {0}")]
    Stall(String),

    #[error("OneShot Receiver Error - {0}")]
    ActorPatternRecv(String),
}
