use std::sync::atomic;

/// While `DEBUG` is true, the library prints debugging information to stderr.
pub static DEBUG: atomic::AtomicBool = atomic::AtomicBool::new(false);

macro_rules! debug {
    ($($x:tt)*) => {
        if crate::debug::DEBUG.load(::std::sync::atomic::Ordering::Relaxed) {
            eprintln!($($x)*);
        }
    }
}
