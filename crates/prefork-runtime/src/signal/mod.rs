//! Signal handling for the supervisor
//!
//! The supervisor blocks SIGINT, SIGTERM and SIGCHLD and consumes them
//! synchronously; forked workers get the original mask back.

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        pub use unix::*;
    }
}
