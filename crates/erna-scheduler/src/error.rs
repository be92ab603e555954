use erna_ledger::LedgerError;
use erna_matching::MatchError;
use thiserror::Error;

/// Errors that can occur while running a match round.
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error(transparent)]
    Match(#[from] MatchError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The matching configuration cannot drive a round.
    #[error("invalid trigger configuration: {0}")]
    Config(String),
}

impl TriggerError {
    /// Whether the underlying store is gone and the owning service should stop.
    pub fn is_fatal(&self) -> bool {
        match self {
            TriggerError::Match(e) => e.is_fatal(),
            TriggerError::Ledger(e) => e.is_fatal(),
            TriggerError::Config(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, TriggerError>;
