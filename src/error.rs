use crate::protocol::HeosResult;
use std::fmt;
use thiserror::Error;

/// Result type for HEOS operations
pub type Result<T> = std::result::Result<T, HeosError>;

/// Errors that can occur when talking to a HEOS device
#[derive(Error, Debug)]
pub enum HeosError {
    /// The channel is not connected, or was closed
    #[error("Channel unavailable")]
    ChannelUnavailable,

    /// The device closed the connection
    #[error("Connection closed")]
    ConnectionClosed,

    /// A frame could not be parsed as a HEOS response
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// The device answered with `result: fail`
    #[error("Command failed: {0}")]
    CommandFailed(Box<CommandFailure>),

    /// The device rejected `system/sign_in`
    #[error("Sign-in failed: {0}")]
    SignInFailed(Box<CommandFailure>),

    /// A successful response is missing something the caller needs
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// An argument was rejected before anything was sent
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No acceptable frame arrived within the timeout budget
    #[error("Request timeout")]
    Timeout,

    /// Discovery could not set up its socket or interface
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HeosError {
    /// Wrap a failed result, extracting its error codes
    pub(crate) fn command_failed(result: HeosResult) -> Self {
        HeosError::CommandFailed(Box::new(CommandFailure::new(result)))
    }

    /// The failure details, for both `CommandFailed` and `SignInFailed`
    pub fn failure(&self) -> Option<&CommandFailure> {
        match self {
            HeosError::CommandFailed(failure) | HeosError::SignInFailed(failure) => Some(failure),
            _ => None,
        }
    }

    /// The protocol error code, if the device reported one
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.failure().and_then(|f| f.error_code)
    }
}

/// Details of a command the device refused
#[derive(Debug, Clone)]
pub struct CommandFailure {
    /// The full response, header and payload
    pub result: HeosResult,
    /// Parsed `eid`
    pub error_code: Option<ErrorCode>,
    /// Parsed `syserrno`, only present for [`ErrorCode::SystemError`]
    pub system_error_code: Option<SystemErrorCode>,
}

impl CommandFailure {
    pub(crate) fn new(result: HeosResult) -> Self {
        let error_code = result
            .var("eid")
            .and_then(|eid| eid.trim().parse::<u32>().ok())
            .map(ErrorCode::from_code);

        let system_error_code = match error_code {
            Some(ErrorCode::SystemError) => result
                .var("syserrno")
                .and_then(|code| code.trim().parse::<i32>().ok())
                .map(SystemErrorCode::from_code),
            _ => None,
        };

        Self {
            result,
            error_code,
            system_error_code,
        }
    }

    /// The command that failed, e.g. `player/get_volume`
    pub fn command(&self) -> &str {
        &self.result.header.command
    }

    /// Human readable text the device attached, if any
    pub fn text(&self) -> Option<&str> {
        self.result.var("text")
    }
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command())?;
        if let Some(code) = self.error_code {
            write!(f, " ({:?})", code)?;
        }
        if let Some(code) = self.system_error_code {
            write!(f, " [{:?}]", code)?;
        }
        if let Some(text) = self.text() {
            write!(f, ": {}", text)?;
        }
        Ok(())
    }
}

/// Error codes carried in the `eid` variable of a failed response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    UnrecognizedCommand,
    InvalidId,
    WrongNumberOfArguments,
    RequestedDataNotAvailable,
    ResourceCurrentlyNotAvailable,
    InvalidCredentials,
    CommandCouldNotBeExecuted,
    UserNotLoggedIn,
    ParameterOutOfRange,
    UserNotFound,
    InternalError,
    SystemError,
    ProcessingPreviousCommand,
    MediaCannotBePlayed,
    OptionNotSupported,
    CommandQueueFull,
    ReachedSkipLimit,
    Unknown(u32),
}

impl ErrorCode {
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => ErrorCode::UnrecognizedCommand,
            2 => ErrorCode::InvalidId,
            3 => ErrorCode::WrongNumberOfArguments,
            4 => ErrorCode::RequestedDataNotAvailable,
            5 => ErrorCode::ResourceCurrentlyNotAvailable,
            6 => ErrorCode::InvalidCredentials,
            7 => ErrorCode::CommandCouldNotBeExecuted,
            8 => ErrorCode::UserNotLoggedIn,
            9 => ErrorCode::ParameterOutOfRange,
            10 => ErrorCode::UserNotFound,
            11 => ErrorCode::InternalError,
            12 => ErrorCode::SystemError,
            13 => ErrorCode::ProcessingPreviousCommand,
            14 => ErrorCode::MediaCannotBePlayed,
            15 => ErrorCode::OptionNotSupported,
            16 => ErrorCode::CommandQueueFull,
            17 => ErrorCode::ReachedSkipLimit,
            other => ErrorCode::Unknown(other),
        }
    }
}

/// Secondary codes carried in `syserrno` when `eid` is [`ErrorCode::SystemError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemErrorCode {
    RemoteServiceReturnedError,
    UserNotRegistered,
    UserNotLoggedIn,
    UserNotFound,
    AuthenticationError,
    AuthorizationError,
    UserParametersInvalid,
    Other(i32),
}

impl SystemErrorCode {
    pub fn from_code(code: i32) -> Self {
        match code {
            -9 => SystemErrorCode::RemoteServiceReturnedError,
            -1061 => SystemErrorCode::UserNotRegistered,
            -1063 => SystemErrorCode::UserNotLoggedIn,
            -1056 => SystemErrorCode::UserNotFound,
            -1201 => SystemErrorCode::AuthenticationError,
            -1232 => SystemErrorCode::AuthorizationError,
            -1239 => SystemErrorCode::UserParametersInvalid,
            other => SystemErrorCode::Other(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::decode_frame;

    #[test]
    fn test_failure_extracts_error_code() {
        let frame = br#"{"heos": {"command": "player/get_volume", "result": "fail", "message": "eid=2&text=ID Not Valid&pid=5"}}"#;
        let error = HeosError::command_failed(decode_frame(frame).unwrap());

        assert_eq!(error.error_code(), Some(ErrorCode::InvalidId));
        let failure = error.failure().unwrap();
        assert_eq!(failure.command(), "player/get_volume");
        assert_eq!(failure.text(), Some("ID Not Valid"));
        assert_eq!(failure.system_error_code, None);
    }

    #[test]
    fn test_failure_extracts_system_error_code() {
        let frame = br#"{"heos": {"command": "system/sign_in", "result": "fail", "message": "eid=12&text=System error&syserrno=-1201"}}"#;
        let failure = CommandFailure::new(decode_frame(frame).unwrap());

        assert_eq!(failure.error_code, Some(ErrorCode::SystemError));
        assert_eq!(
            failure.system_error_code,
            Some(SystemErrorCode::AuthenticationError)
        );
    }

    #[test]
    fn test_unknown_codes_are_preserved() {
        assert_eq!(ErrorCode::from_code(99), ErrorCode::Unknown(99));
        assert_eq!(SystemErrorCode::from_code(-5), SystemErrorCode::Other(-5));
    }

    #[test]
    fn test_syserrno_ignored_for_other_codes() {
        let frame = br#"{"heos": {"command": "browse/browse", "result": "fail", "message": "eid=9&syserrno=-9"}}"#;
        let failure = CommandFailure::new(decode_frame(frame).unwrap());

        assert_eq!(failure.error_code, Some(ErrorCode::ParameterOutOfRange));
        assert_eq!(failure.system_error_code, None);
    }
}
