use tracing::error;

use super::model::DeviceActionResponse;
use super::model::Status;

/// Failure conditions of the DuerOS integration.
///
/// Cloneable so that callers attached to a shared refresh all receive the same outcome.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DuerosError {
    /// The remote session is invalid; requires re-authentication and is never retried.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// Fetching the appliance list failed; the next scheduled poll retries.
    #[error("Update failed: {0}")]
    UpdateFailed(String),

    /// The remote rejected a command.
    #[error("Command failed: {0}")]
    CommandFailed(String),
}

impl DuerosError {
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, DuerosError::AuthFailed(_))
    }
}

/// Interpret a command response: NOT_LOGIN is an auth failure, any other non-OK
/// status is a command failure.
pub fn check_response(rsp: &DeviceActionResponse) -> Result<(), DuerosError> {
    match rsp.status {
        Status::Ok => Ok(()),
        Status::NotLogin => {
            error!("{}", rsp.msg);
            Err(DuerosError::AuthFailed(rsp.msg.clone()))
        }
        Status::Other(code) => {
            error!(code, "{}", rsp.msg);
            Err(DuerosError::CommandFailed(rsp.msg.clone()))
        }
    }
}
