//! Core types for rememo
//!
//! - [`function`]: identities of memoized callables
//! - [`key`]: canonical call keys and keyword arguments
//! - [`store`]: the store contract and the in-memory store
//! - [`error`]: shared error type

pub mod error;
pub mod function;
pub mod key;
pub mod store;

pub use error::{MemoError, Result, StoreFault};
pub use function::{CacheIdentity, Function, FunctionId, Invocable};
pub use key::{CallKey, KeyCanonicalizer, KeyEncoder, KeyStrategy, Kwargs, KWARGS_TAG};
pub use store::{LocalStore, ResultStore, SubCache};
