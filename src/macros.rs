#![allow(unused_macros)]

/// Helper macro for locking items, propagating a poisoned lock as [`crate::Error::LockError`]
///
/// ```rust, ignore
///  let guard = lock!(session.exclusive);
/// ```
macro_rules! lock {
    ($lock:expr) => {
        $lock.lock().map_err(|_| crate::Error::LockError)?
    };
}

/// Helper macro for reading of dashmap entries through a closure
///
/// ```rust, ignore
/// let kind = map_with!(self.nodes, &id, |node| node.kind);
/// ```
macro_rules! map_with {
    ($map:expr, $key:expr, $closure:expr) => {{
        $map.get($key).map(|entry| $closure(entry.value()))
    }};
}
