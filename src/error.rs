use std::io;

use globset::Error as GlobError;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;
use tokio::sync::mpsc::error::SendError as TokioSendError;

#[cfg(feature = "service")]
use notify::{Error as NotifyError, ErrorKind as NotifyErrorKind};

use crate::event::IndexEvent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum IniError {
    #[error("Event channel error: {0}")]
    Channel(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Custom error: {0}")]
    Custom(String),
    #[error("File {path} is {size} bytes, above the {limit} byte indexing limit")]
    FileTooLarge { path: String, size: u64, limit: u64 },
    #[error("File System error: {0}")]
    Io(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("You do not have permission to access this resource")]
    PermissionDenied,
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for IniError {
    fn from(src: toml::de::Error) -> IniError {
        IniError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for IniError {
    fn from(src: toml::ser::Error) -> IniError {
        IniError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<JsonError> for IniError {
    fn from(src: JsonError) -> IniError {
        IniError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<io::Error> for IniError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => IniError::NotFound(format!("{x}")),
            io::ErrorKind::PermissionDenied => IniError::PermissionDenied,
            _ => IniError::Io(format!("IOError: {}", x.kind())),
        }
    }
}

impl From<GlobError> for IniError {
    fn from(x: GlobError) -> Self {
        IniError::Config(format!("Glob parse failed: {x}"))
    }
}

impl From<TokioSendError<IndexEvent>> for IniError {
    fn from(x: TokioSendError<IndexEvent>) -> Self {
        IniError::Channel(format!(
            "Channel update send Error, could not transmit index event {:?}",
            x.0
        ))
    }
}

#[cfg(feature = "service")]
impl From<NotifyError> for IniError {
    fn from(notify_error: NotifyError) -> Self {
        match notify_error.kind {
            NotifyErrorKind::Generic(msg) => IniError::Custom(format!(
                "notify-debouncer: {}, paths: {:?}",
                msg, notify_error.paths
            )),
            NotifyErrorKind::Io(io_error) => IniError::Io(format!(
                "notify-debouncer: io error {}, paths: {:?}",
                io_error.kind(),
                notify_error.paths
            )),
            NotifyErrorKind::PathNotFound => IniError::NotFound(format!(
                "notify-debouncer: path(s) not found: {:?}",
                notify_error.paths
            )),
            NotifyErrorKind::WatchNotFound => IniError::NotFound(format!(
                "notify-debouncer: watch not found, paths: {:?}",
                notify_error.paths
            )),
            NotifyErrorKind::InvalidConfig(_) => {
                IniError::Config("notify-debouncer invalid config".to_string())
            }
            NotifyErrorKind::MaxFilesWatch => {
                IniError::Custom("notify-debouncer max file watch limit reached".to_string())
            }
        }
    }
}
