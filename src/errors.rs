use thiserror::Error;

pub type Result<T> = std::result::Result<T, SimError>;

/// Fatal simulation failures. Arena and stack exhaustion abort the run
/// immediately so no partially built iteration is ever observed.
#[derive(Debug, Error, PartialEq)]
pub enum SimError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("sector {sector} overflowed its arena chunk ({cap} nodes)")]
    ArenaOverflow { sector: usize, cap: usize },
    #[error("merge phase overflowed its arena chunk ({cap} nodes)")]
    MergeOverflow { cap: usize },
    #[error("work stack exceeded {limit} entries during {phase}")]
    StackOverflow { phase: &'static str, limit: usize },
    #[error("full leaf bucket of coincident bodies cannot subdivide further")]
    DegenerateBucket,
}
