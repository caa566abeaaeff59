//! Function identity for memoized callables
//!
//! A [`FunctionId`] names one cache partition. Locally two ids are equal only
//! if they were handed out by the same registration, so unrelated closures
//! that happen to share a name never alias. Across processes the qualified
//! name is used instead (see the distributed backend's key serializer).

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// Comparable handle to a registered callable
#[derive(Clone)]
pub struct FunctionId {
    serial: u64,
    name: Arc<str>,
}

impl FunctionId {
    /// Allocate a fresh identity carrying `name`
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
        }
    }

    /// Stable, fully-qualified name of the callable
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Process-local serial number
    pub fn serial(&self) -> u64 {
        self.serial
    }
}

impl PartialEq for FunctionId {
    fn eq(&self, other: &Self) -> bool {
        self.serial == other.serial
    }
}

impl Eq for FunctionId {}

impl Hash for FunctionId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.serial.hash(state);
    }
}

impl fmt::Debug for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FunctionId({}#{})", self.name, self.serial)
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Anything that owns a cache partition
pub trait CacheIdentity {
    /// Identity of this value itself
    fn cache_id(&self) -> &FunctionId;

    /// Identity of the callable this value wraps, if it is a wrapper
    fn unwrapped_id(&self) -> Option<&FunctionId> {
        None
    }

    /// Partition results are stored under: the wrapped callable's when there
    /// is one, otherwise this value's own.
    fn partition(&self) -> &FunctionId {
        self.unwrapped_id().unwrap_or_else(|| self.cache_id())
    }
}

/// A callable the engine can run on a miss
pub trait Invocable<A, R>: CacheIdentity {
    fn invoke(&self, args: A) -> R;
}

/// A named, shareable callable taking `A` and returning `R`
pub struct Function<A, R> {
    id: FunctionId,
    body: Arc<dyn Fn(A) -> R + Send + Sync>,
}

impl<A, R> Function<A, R> {
    /// Register `body` under `name`
    pub fn new<F>(name: impl Into<Arc<str>>, body: F) -> Self
    where
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        Self {
            id: FunctionId::new(name),
            body: Arc::new(body),
        }
    }

    /// Register `body` under its compiler-assigned type name
    pub fn anonymous<F>(body: F) -> Self
    where
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        Self::new(std::any::type_name::<F>(), body)
    }

    pub fn id(&self) -> &FunctionId {
        &self.id
    }

    pub fn name(&self) -> &str {
        self.id.name()
    }

    /// Call the underlying body directly, bypassing any cache
    pub fn call(&self, args: A) -> R {
        (self.body)(args)
    }
}

impl<A, R> Clone for Function<A, R> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            body: Arc::clone(&self.body),
        }
    }
}

impl<A, R> fmt::Debug for Function<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function").field("id", &self.id).finish()
    }
}

impl<A, R> CacheIdentity for Function<A, R> {
    fn cache_id(&self) -> &FunctionId {
        &self.id
    }
}

impl<A, R> Invocable<A, R> for Function<A, R> {
    fn invoke(&self, args: A) -> R {
        self.call(args)
    }
}

/// Register a named function under its module-qualified path.
///
/// ```
/// use memo_core::function;
///
/// fn add_two(v: i64) -> i64 {
///     v + 2
/// }
///
/// let f = function!(add_two);
/// assert!(f.name().ends_with("::add_two"));
/// assert_eq!(f.call(5), 7);
/// ```
#[macro_export]
macro_rules! function {
    ($f:ident) => {
        $crate::function::Function::new(concat!(module_path!(), "::", stringify!($f)), $f)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn double(v: i64) -> i64 {
        v * 2
    }

    #[test]
    fn test_ids_are_unique_per_registration() {
        let a = Function::new("same", |v: i64| v);
        let b = Function::new("same", |v: i64| v);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.name(), b.name());
    }

    #[test]
    fn test_clone_shares_identity() {
        let a = Function::new("f", |v: i64| v + 1);
        let b = a.clone();
        assert_eq!(a.id(), b.id());

        let mut set = HashSet::new();
        set.insert(a.id().clone());
        assert!(set.contains(b.id()));
    }

    #[test]
    fn test_function_macro_qualifies_name() {
        let f = function!(double);
        assert_eq!(f.name(), concat!(module_path!(), "::double"));
        assert_eq!(f.call(21), 42);
    }

    #[test]
    fn test_anonymous_uses_type_name() {
        let f = Function::anonymous(|v: u8| v);
        assert!(f.name().contains("closure"));
    }

    #[test]
    fn test_partition_defaults_to_own_id() {
        let f = Function::new("f", |v: i64| v);
        assert_eq!(f.partition(), f.id());
        assert!(f.unwrapped_id().is_none());
    }
}
