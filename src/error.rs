// Error handling for the NextBus fusion engine.
//
// Only a broken static schedule is allowed to kill the process; everything
// the realtime side throws is recoverable per poll cycle.

#[derive(Debug)]
pub enum NextBusError {
    /// A required static schedule table is missing or unreadable. Fatal.
    LoadError(String),
    /// Transport-level failure talking to a realtime feed. Recoverable.
    NetworkError(String),
    /// A realtime payload did not match the expected shape. Recoverable.
    DecodeError(String),
}

impl std::fmt::Display for NextBusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NextBusError::LoadError(e) => write!(f, "Load error: {}", e),
            NextBusError::NetworkError(e) => write!(f, "Network error: {}", e),
            NextBusError::DecodeError(e) => write!(f, "Decode error: {}", e),
        }
    }
}

impl std::error::Error for NextBusError {}

pub type Result<T> = std::result::Result<T, NextBusError>;
