//! Error types for the distributed cache

use memo_core::MemoError;
use std::io;
use thiserror::Error;

/// Errors that can occur while talking to the shared cache
#[derive(Error, Debug)]
pub enum DistributedError {
    /// Socket-level failure
    #[error("Network error: {0}")]
    Io(#[from] io::Error),

    /// Host still unreachable after one re-election and retry
    #[error("Cache host at {address} unreachable: {reason}")]
    Connectivity { address: String, reason: String },

    /// Shared secret mismatch
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Remote key does not exist
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Peer sent something out of sequence
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Frame could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Frame larger than the configured limit
    #[error("Frame of {0} bytes exceeds the configured limit")]
    FrameTooLarge(usize),

    /// Address did not resolve
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

impl DistributedError {
    /// Whether this failure means the peer went away and a re-election may help
    pub fn is_host_lost(&self) -> bool {
        match self {
            DistributedError::Io(err) => matches!(
                err.kind(),
                io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::NotConnected
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

impl From<DistributedError> for MemoError {
    fn from(err: DistributedError) -> Self {
        MemoError::store(err)
    }
}

/// Result type for distributed operations
pub type Result<T> = std::result::Result<T, DistributedError>;
