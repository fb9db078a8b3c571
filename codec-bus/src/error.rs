use thiserror::Error;

pub type Result<T> = std::result::Result<T, CodecError>;

/// Every fault the control plane can raise.
///
/// `State` and `Configuration` are returned synchronously from the call that
/// caused them. `Data`, `Engine` and `ResourceExhausted` only ever reach the
/// application through the instance's error callback. `Aborted` is internal:
/// it is what a pending `flush()` resolves to after `reset()` or `close()`,
/// and it is never handed to the error callback.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid state: {0}")]
    State(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("data error: {0}")]
    Data(String),

    #[error("engine error: {0}")]
    Engine(String),

    #[error("aborted: {0}")]
    Aborted(String),

    #[error("codec reclaimed: {0}")]
    ResourceExhausted(String),
}

impl CodecError {
    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        Self::Data(msg.into())
    }

    pub fn aborted(msg: impl Into<String>) -> Self {
        Self::Aborted(msg.into())
    }

    /// Keeps the whole context chain of an engine failure.
    pub fn engine(err: &anyhow::Error) -> Self {
        Self::Engine(format!("{:#}", err))
    }

    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }
}
