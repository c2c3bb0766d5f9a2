use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    MissingInterface,
    BadNetworkRange(String),
    DirectoryDoesNotExist(String),
    NotInRange(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::MissingInterface => write!(f, "Network interface must not be empty"),
            ConfigError::BadNetworkRange(e) => write!(f, "Network range error: {}", e),
            ConfigError::DirectoryDoesNotExist(e) => write!(f, "Directory error: {}", e),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

/// The connection status report could not be read.
///
/// Never mapped to an empty session list: an empty snapshot means "nobody is
/// connected" and would tear down every running capture.
#[derive(Debug)]
pub enum StatusError {
    Unreadable(PathBuf, std::io::Error),
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusError::Unreadable(path, e) => {
                write!(f, "Status file {} is unreadable: {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for StatusError {}

#[derive(Debug)]
pub enum StorageError {
    WriteFailed(String),
    ReadFailed(String),
    Corrupt(String),
    Locked(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::WriteFailed(e) => write!(f, "Storage write failed: {}", e),
            StorageError::ReadFailed(e) => write!(f, "Storage read failed: {}", e),
            StorageError::Corrupt(e) => write!(f, "Storage content is corrupt: {}", e),
            StorageError::Locked(e) => write!(f, "Storage is locked: {}", e),
        }
    }
}

impl std::error::Error for StorageError {}

#[derive(Debug)]
pub enum CaptureError {
    LaunchFailed(String),
    MissingStdout,
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::LaunchFailed(e) => write!(f, "Capture process launch failed: {}", e),
            CaptureError::MissingStdout => write!(f, "Capture process has no stdout pipe"),
        }
    }
}

impl std::error::Error for CaptureError {}

#[derive(Debug)]
pub enum ControllerError {
    StatusError(StatusError),
    StorageError(StorageError),
}

impl ControllerError {
    /// Errors that mean the loop would be acting on false ground truth.
    pub fn is_fatal_input(&self) -> bool {
        matches!(
            self,
            ControllerError::StatusError(_) | ControllerError::StorageError(_)
        )
    }
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::StatusError(e) => write!(f, "Status error: {}", e),
            ControllerError::StorageError(e) => write!(f, "Storage error: {}", e),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<StatusError> for ControllerError {
    fn from(err: StatusError) -> Self {
        ControllerError::StatusError(err)
    }
}

impl From<StorageError> for ControllerError {
    fn from(err: StorageError) -> Self {
        ControllerError::StorageError(err)
    }
}
