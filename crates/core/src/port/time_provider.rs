// Time Provider Port (run report timestamps)

/// Time provider interface (allows fixed clocks in tests)
pub trait TimeProvider: Send + Sync {
    /// Get current time in milliseconds since epoch
    fn now_millis(&self) -> i64;
}

/// System time provider (production)
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

pub mod mocks {
    use super::TimeProvider;

    /// Clock frozen at one instant
    pub struct FixedTimeProvider(pub i64);

    impl TimeProvider for FixedTimeProvider {
        fn now_millis(&self) -> i64 {
            self.0
        }
    }
}
