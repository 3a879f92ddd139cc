// Worker & dispatcher constants (no magic values)
use std::time::Duration;

/// Pause before a worker starts a claimed job (500ms)
/// Spreads out backend API calls when a whole group starts at once
pub const DEFAULT_PACING_DELAY: Duration = Duration::from_millis(500);

/// Drain window after cancellation (10s)
/// In-flight backend calls get this long to observe the cancel token
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Settle wait after the last group succeeds (2s)
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Time a backend child process gets between SIGTERM and SIGKILL (5s)
pub const GRACEFUL_KILL_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll interval while waiting for a signalled child to exit (100ms)
pub const KILL_POLL_INTERVAL: Duration = Duration::from_millis(100);
