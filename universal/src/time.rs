//! When the `fake_time` feature is disabled, this module just re-exports [std::time::SystemTime].
//!
//! When the `fake_time` feature is enabled, an alternative fake [SystemTime] is exported. Futures run with
//! [with_fake_time] observe a clock paused at the unix epoch, which only moves when [advance] is called. This allows
//! tests of time-dependent behaviour (such as cache expiry) to run in a fully deterministic way.

#[cfg(not(feature = "fake_time"))]
pub type SystemTime = std::time::SystemTime;

#[cfg(feature = "fake_time")]
pub use time_impl::*;

#[cfg(feature = "fake_time")]
mod time_impl {
    use std::{cell::Cell, future::Future, time::Duration};

    tokio::task_local! {
        /// The duration between the current fake time and the `UNIX_EPOCH`. This is task-local, to avoid tests
        /// interfering with each other.
        static CURRENT_TIME: Cell<Duration>;
    }

    /// A fake implementation of [std::time::SystemTime]. Inside [with_fake_time], the value of `SystemTime::now` is
    /// controlled with [advance]. Outside of it, the real time is used.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct SystemTime(std::time::SystemTime);

    impl SystemTime {
        pub const UNIX_EPOCH: SystemTime = SystemTime(std::time::SystemTime::UNIX_EPOCH);

        pub fn now() -> Self {
            CURRENT_TIME
                .try_with(|current| SystemTime(std::time::SystemTime::UNIX_EPOCH + current.get()))
                .unwrap_or_else(|_| SystemTime(std::time::SystemTime::now()))
        }

        pub fn elapsed(&self) -> Result<Duration, SystemTimeError> {
            SystemTime::now().duration_since(*self)
        }

        pub fn duration_since(&self, earlier: SystemTime) -> Result<Duration, SystemTimeError> {
            self.0
                .duration_since(earlier.0)
                .map_err(|e| SystemTimeError(e.duration()))
        }

        pub fn checked_add(&self, duration: Duration) -> Option<SystemTime> {
            self.0.checked_add(duration).map(SystemTime)
        }
    }

    #[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
    pub struct SystemTimeError(Duration);

    impl SystemTimeError {
        pub fn duration(&self) -> Duration {
            self.0
        }
    }

    /// Run `future` with the fake time paused at the unix epoch.
    pub async fn with_fake_time<F: Future>(future: F) -> F::Output {
        CURRENT_TIME.scope(Cell::new(Duration::ZERO), future).await
    }

    /// Advance the fake time by this duration. Panics if called outside of [with_fake_time].
    pub fn advance(delta: Duration) {
        CURRENT_TIME.with(|current| current.set(current.get() + delta));
    }
}
