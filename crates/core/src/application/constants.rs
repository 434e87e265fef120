// Dispatch constants (No magic values)
use std::time::Duration;

/// Sleep between fetch attempts when the inbound queue is empty (100ms)
pub const IDLE_SLEEP_DURATION: Duration = Duration::from_millis(100);

/// Sleep after a recoverable dispatch-cycle error before retry (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// Default upper bound on items pulled per cycle
pub const DEFAULT_MAX_BATCH: usize = 5;

/// Default bound on the wait for the next worker reply (30s)
pub const DEFAULT_GATHER_TIMEOUT: Duration = Duration::from_secs(30);

/// Push attempts on a full outbound queue before giving up on a result
pub const PUBLISH_FULL_RETRY_LIMIT: usize = 50;

/// Bound on waiting for workers to exit after STOP (5s)
pub const WORKER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
