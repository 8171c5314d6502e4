#![allow(unused_macros)]

/// Helper macro for locking items
///
/// ```rust, ignore
///  let mut rng = lock!(shared.inner);
///  let value = rng.gen_64();
/// ```
macro_rules! lock {
    ($lock:expr) => {
        $lock.lock().expect("Failed to acquire lock")
    };
}

/// Helper macro for running a closure against a locked item
///
/// ```rust, ignore
///  let value = with_lock!(shared.inner, |rng: &mut EntropyProvider| rng.gen_32());
/// ```
macro_rules! with_lock {
    ($lock:expr, $closure:expr) => {{
        let mut guard = $lock.lock().expect("Failed to acquire lock");
        $closure(&mut *guard)
    }};
}
