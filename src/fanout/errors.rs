//! Fanout errors

use thiserror::Error;

/// Result type for segment-host fanout operations
pub type FanoutResult<T> = Result<T, FanoutError>;

#[derive(Debug, Error)]
pub enum FanoutError {
    #[error("{0} environment variable not set")]
    EnvMissing(&'static str),

    #[error("unable to connect to {0}: {1}")]
    Connect(String, String),

    #[error("ssh session setup failed for {0}: {1}")]
    Session(String, String),

    #[error("ssh authentication failed for {0}: {1}")]
    Auth(String, String),

    #[error("command execution failed on {0} ({1}): {2}")]
    Exec(String, String, String),

    #[error("command on {0} ({1}) exited with status {2}: {3}")]
    CommandFailed(String, String, i32, String),

    #[error("scp to {0} failed: {1}")]
    Scp(String, String),

    #[error("ssh pool mutex poisoned")]
    PoolPoisoned,

    #[error("failed to write plugin config {0}: {1}")]
    PluginConfig(String, String),
}
