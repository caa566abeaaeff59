use thiserror::Error;

/// Boxed error produced by a [`ResultStore`](crate::store::ResultStore) backend
pub type StoreFault = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum MemoError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cached result for {function} could not be decoded: {source}")]
    Decode {
        function: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(#[source] StoreFault),
}

impl MemoError {
    /// Wrap a backend failure
    pub fn store(err: impl Into<StoreFault>) -> Self {
        MemoError::Store(err.into())
    }

    /// Borrow the backend failure as a concrete type, if it is one
    pub fn store_fault<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            MemoError::Store(fault) => fault.downcast_ref::<E>(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, MemoError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_store_fault_downcast() {
        let err = MemoError::store(io::Error::new(io::ErrorKind::ConnectionRefused, "gone"));
        let io_err = err.store_fault::<io::Error>().unwrap();
        assert_eq!(io_err.kind(), io::ErrorKind::ConnectionRefused);
        assert!(err.to_string().starts_with("Store error"));
    }

    #[test]
    fn test_non_store_has_no_fault() {
        let err = MemoError::Config("capacity must be > 0".into());
        assert!(err.store_fault::<io::Error>().is_none());
        assert_eq!(err.to_string(), "Configuration error: capacity must be > 0");
    }
}
