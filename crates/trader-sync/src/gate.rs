//! 동시성 게이트.
//!
//! 고정 용량의 카운팅 세마포어와 작업 추적기를 묶은 타입입니다.
//! 게이트 슬롯(`GatePermit`)의 수명이 곧 진행 중인 작업 하나의 수명이며,
//! `spawn`으로 실행한 작업이 끝나면 (성공/실패/panic 무관) 슬롯이 반환됩니다.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

use crate::error::{Result, SyncError};

/// 게이트 슬롯 하나.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

/// 용량 제한 게이트.
#[derive(Debug)]
pub struct Gate {
    name: &'static str,
    capacity: usize,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    peak: AtomicUsize,
}

impl Gate {
    /// 새 게이트 생성 (용량 최소 1).
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            name,
            capacity,
            permits: Arc::new(Semaphore::new(capacity)),
            tracker: TaskTracker::new(),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 현재 점유 중인 슬롯 수.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.permits.available_permits()
    }

    /// 실행 중 관측된 최대 점유 슬롯 수.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }

    /// 슬롯 획득. 게이트가 가득 차면 대기하며, 취소되면 `SyncError::Cancelled`.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<GatePermit> {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            permit = self.permits.clone().acquire_owned() => permit
                .map_err(|_| SyncError::Worker(format!("{} gate closed", self.name)))?,
        };

        self.peak.fetch_max(self.in_flight(), Ordering::Relaxed);
        Ok(GatePermit { _permit: permit })
    }

    /// 슬롯을 점유한 채로 작업 실행. 작업이 끝나면 슬롯이 반환됩니다.
    pub fn spawn<F>(&self, permit: GatePermit, work: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(async move {
            let _permit = permit;
            work.await;
        })
    }

    /// 이 게이트로 실행한 모든 작업이 끝날 때까지 대기.
    ///
    /// 호출 후에는 새 작업을 받지 않는다는 전제입니다 (실행 단위마다 새 게이트 사용).
    pub async fn join(&self) {
        self.tracker.close();
        debug!(gate = self.name, pending = self.tracker.len(), "게이트 drain 대기");
        self.tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_capacity_is_respected() {
        let gate = Arc::new(Gate::new("fetch", 2));
        let cancel = CancellationToken::new();
        let running = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let permit = gate.acquire(&cancel).await.unwrap();
            let running = running.clone();
            let max_seen = max_seen.clone();
            gate.spawn(permit, async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            });
        }

        gate.join().await;
        assert!(max_seen.load(Ordering::SeqCst) <= 2);
        assert_eq!(gate.peak(), 2);
        assert_eq!(gate.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_acquire_blocks_when_full() {
        let gate = Gate::new("save", 1);
        let cancel = CancellationToken::new();

        let held = gate.acquire(&cancel).await.unwrap();
        assert_eq!(gate.in_flight(), 1);

        let blocked =
            tokio::time::timeout(Duration::from_millis(20), gate.acquire(&cancel)).await;
        assert!(blocked.is_err());

        drop(held);
        assert!(gate.acquire(&cancel).await.is_ok());
    }

    #[tokio::test]
    async fn test_acquire_cancelled() {
        let gate = Gate::new("fetch", 1);
        let cancel = CancellationToken::new();
        let _held = gate.acquire(&cancel).await.unwrap();

        cancel.cancel();
        assert!(matches!(
            gate.acquire(&cancel).await,
            Err(SyncError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_permit_released_on_panic() {
        let gate = Gate::new("fetch", 1);
        let cancel = CancellationToken::new();

        let permit = gate.acquire(&cancel).await.unwrap();
        let handle = gate.spawn(permit, async {
            panic!("boom");
        });
        assert!(handle.await.is_err());

        gate.join().await;
        assert_eq!(gate.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_join_waits_for_work() {
        let gate = Gate::new("save", 4);
        let cancel = CancellationToken::new();
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let permit = gate.acquire(&cancel).await.unwrap();
            let done = done.clone();
            gate.spawn(permit, async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }

        gate.join().await;
        assert_eq!(done.load(Ordering::SeqCst), 3);
    }
}
