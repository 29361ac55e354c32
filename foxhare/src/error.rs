use thiserror::Error;

/// Everything that can go wrong is a construction/startup failure.
/// Once a run is ticking there are no recoverable error paths: a tick either
/// completes all of its stages or the process aborts.
#[derive(Debug, Error)]
pub enum Error {
    #[error("landscape dimension {dim} is below the minimum of {}", crate::landscape::MIN_DIM)]
    LandscapeTooSmall { dim: usize },

    #[error("unknown policy kind {0:?}")]
    UnknownPolicy(String),

    #[error("invalid parameter: {0}")]
    InvalidParam(&'static str),

    #[error("policy archive holds no generations")]
    EmptyArchive,

    #[error(
        "policy archive shape mismatch: {found_units} units of {found_size} floats, \
         population expects {expected_units} units of {expected_size} floats"
    )]
    ArchiveShape {
        expected_units: usize,
        found_units: usize,
        expected_size: usize,
        found_size: usize,
    },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("archive encode: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("archive decode: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

pub type Result<T> = std::result::Result<T, Error>;
