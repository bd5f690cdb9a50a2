use thiserror::Error;

use crate::options::ParseError;
use crate::server::protocol::Reject;

/// Everything that can end an invocation with a non-zero exit.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("{0}")]
    Options(#[from] ParseError),

    /// Environment problem before any coordination logic runs.
    #[error("{0}")]
    Linker(String),

    /// The server for this display belongs to a different user.
    #[error("server is owned by uid {server}, not uid {caller}")]
    UserMismatch { server: u32, caller: u32 },

    /// The server for this display reports a different bound display.
    #[error("server is bound to display '{server}', not '{caller}'")]
    DisplayMismatch { server: String, caller: String },

    /// Generic coordination failure: publication race lost twice, or the
    /// transport stayed unreachable after the one allowed fallback.
    #[error("{0}")]
    Failed(String),
}

impl LaunchError {
    pub fn exit_code(&self) -> u8 {
        match self {
            LaunchError::Failed(_) => 1,
            LaunchError::Options(_) => 2,
            LaunchError::Linker(_) => 3,
            LaunchError::UserMismatch { .. } => 4,
            LaunchError::DisplayMismatch { .. } => 5,
        }
    }
}

impl From<Reject> for LaunchError {
    fn from(reject: Reject) -> Self {
        match reject {
            Reject::UserMismatch { server, caller } => {
                LaunchError::UserMismatch { server, caller }
            }
            Reject::DisplayMismatch { server, caller } => {
                LaunchError::DisplayMismatch { server, caller }
            }
        }
    }
}
