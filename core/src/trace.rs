//! Logging shim.
//! With the `tracing` feature the macros forward to `tracing`. Otherwise they only type-check
//! their arguments and expand to `()`, so they may stand in expression position.

#[cfg(feature = "tracing")]
pub(crate) use tracing::{debug, info, warn as warning};

#[cfg(not(feature = "tracing"))]
macro_rules! debug {
    ($($t: tt)*) => {
        if false {
            let _ = format_args!($($t)*);
        }
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! info {
    ($($t: tt)*) => {
        if false {
            let _ = format_args!($($t)*);
        }
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! warning {
    ($($t: tt)*) => {
        if false {
            let _ = format_args!($($t)*);
        }
    };
}

#[cfg(not(feature = "tracing"))]
pub(crate) use {debug, info, warning};
