use std::time::Duration;

/// Default spacing between handshake probes.
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Ready,
    Error,
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    Ready,
    Error,
    Timeout,
}

/// Number of probes that fit in `timeout` at `interval` spacing.
pub fn retries_for(timeout: Duration, interval: Duration) -> u64 {
    let interval_ms = interval.as_millis().max(1);
    u64::try_from(timeout.as_millis() / interval_ms).unwrap_or(u64::MAX)
}

/// Polls `is_ready` until it leaves [`ReadyState::Pending`] or the retry
/// budget runs out. Between polls `side_effect` fires (typically re-sending a
/// probe) and the task sleeps for `interval`.
pub async fn retry_until_ready<R, S>(
    mut retries: u64,
    mut is_ready: R,
    mut side_effect: S,
    interval: Duration,
) -> RetryOutcome
where
    R: FnMut() -> ReadyState,
    S: FnMut(),
{
    loop {
        match is_ready() {
            ReadyState::Ready => return RetryOutcome::Ready,
            ReadyState::Error => return RetryOutcome::Error,
            ReadyState::Pending => {}
        }

        retries = retries.saturating_sub(1);
        if retries == 0 {
            return RetryOutcome::Timeout;
        }

        side_effect();
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_divide_timeout_by_interval() {
        assert_eq!(retries_for(Duration::from_secs(120), DEFAULT_POLLING_INTERVAL), 240);
        assert_eq!(retries_for(Duration::from_millis(5), Duration::ZERO), 5);
    }
}
