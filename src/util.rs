//! This is an internal module that contains utility functionality used by other modules.

/// Default iteration cap for bounded register polls.
pub const MAX_ITERS: u32 = 300_000;

/// Spin while `$cond` holds, returning `Err($err)` from the enclosing function after
/// `$max` iterations.
macro_rules! bounded_loop {
    ($cond:expr, $err:expr, $max:expr) => {{
        let mut i: u32 = 0;
        while $cond {
            i += 1;
            if i >= $max {
                return Err($err);
            }
        }
    }};
}

pub(crate) use bounded_loop;
