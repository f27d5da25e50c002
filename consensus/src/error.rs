use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("an election for root {0} is already active")]
    ElectionExists(String),

    #[error("{0}")]
    Other(String),
}
