//! 재시도 래퍼.
//!
//! 네트워크 오류나 일시적 API 실패 시 선형 backoff(`backoff_base * attempt`)로
//! 지정된 횟수만큼 재시도합니다. 최종 실패 시 오류를 전파하지 않고 `None`을 반환하며,
//! 실패 정보는 로그로만 남습니다.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// 한 번의 backoff 대기 상한 (1시간)
pub const MAX_BACKOFF: Duration = Duration::from_secs(3600);

/// 재시도 정책.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 최대 시도 횟수 (최소 1)
    pub max_attempts: u32,
    /// backoff 기준 간격 (시도 n 실패 후 `backoff_base * n` 대기)
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base,
        }
    }

    /// `attempt`번째 (1부터) 실패 후 대기 시간. [`MAX_BACKOFF`]를 넘지 않습니다.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base
            .checked_mul(attempt)
            .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
    }
}

/// 재시도 포함 호출.
///
/// `call`은 시도 번호(1부터)를 받습니다. 취소 토큰은 매 시도 전과 backoff 대기 중에
/// 확인하며, 취소되면 즉시 `None`을 반환합니다.
pub async fn call_with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    label: &str,
    mut call: F,
) -> Option<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        if cancel.is_cancelled() {
            debug!(label = label, attempt = attempt, "취소 요청으로 재시도 중단");
            return None;
        }

        match call(attempt).await {
            Ok(value) => return Some(value),
            Err(e) => {
                if attempt < max_attempts {
                    let delay = policy.backoff(attempt);
                    warn!(
                        label = label,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "호출 실패, 재시도 예정"
                    );

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => {
                            debug!(label = label, "취소 요청으로 backoff 대기 중단");
                            return None;
                        }
                    }
                } else {
                    warn!(
                        label = label,
                        attempts = max_attempts,
                        error = %e,
                        "호출 최종 실패"
                    );
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let started = Instant::now();
        let result = call_with_retry(&policy, &cancel, "test", |attempt| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                if attempt < 3 {
                    Err(format!("transient failure #{}", attempt))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result, Some(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // backoff_base * (1 + 2)
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_returns_none() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100));
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result: Option<u32> = call_with_retry(&policy, &cancel, "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<u32, _>("always") }
        })
        .await;

        assert_eq!(result, None);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let policy = RetryPolicy::new(5, Duration::from_secs(60));
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result: Option<()> = call_with_retry(&policy, &cancel, "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>("down") }
        })
        .await;

        assert_eq!(result, None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = AtomicU32::new(0);

        let result: Option<()> = call_with_retry(&RetryPolicy::default(), &cancel, "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<(), String>(()) }
        })
        .await;

        assert_eq!(result, None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_policy_backoff() {
        let policy = RetryPolicy::new(0, Duration::from_millis(500));
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(3), Duration::from_millis(1500));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::new(3, Duration::from_secs(u64::MAX / 2));
        assert_eq!(policy.backoff(3), MAX_BACKOFF);

        let policy = RetryPolicy::new(3, Duration::from_secs(2000));
        assert_eq!(policy.backoff(2), MAX_BACKOFF);
    }
}
