//! 데이터 소스 인터페이스.
//!
//! - [`Fetch`]: 비동기 데이터 소스 (HTTP 클라이언트 등)
//! - [`BlockingFetch`]: 동기 I/O를 수행하는 데이터 소스.
//!   [`OnWorkerPool`]로 감싸면 blocking thread pool에서 실행되어 스케줄러를 멈추지 않습니다.
//!
//! 엔진은 데이터 소스를 항상 [`fetch_with_retry`]를 통해서만 호출합니다.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, SyncError};
use crate::model::{SyncWindow, Table};
use crate::retry::{call_with_retry, RetryPolicy};

/// 비동기 데이터 소스.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// 종목의 구간 데이터 조회. 데이터가 없으면 `Ok(None)`.
    async fn fetch(&self, entity: &str, window: &SyncWindow) -> Result<Option<Table>>;

    /// 재시도 소진 후 호출됩니다. 오염된 세션/클라이언트를 재생성할 때 사용합니다.
    fn reset(&self) {}
}

/// 동기(blocking) 데이터 소스.
pub trait BlockingFetch: Send + Sync + 'static {
    fn fetch_blocking(&self, entity: &str, window: &SyncWindow) -> Result<Option<Table>>;

    fn reset(&self) {}
}

/// blocking 데이터 소스를 제한된 워커 풀에서 실행하는 어댑터.
pub struct OnWorkerPool<F> {
    inner: Arc<F>,
    workers: Arc<Semaphore>,
    max_workers: usize,
}

impl<F: BlockingFetch> OnWorkerPool<F> {
    /// `max_workers`개까지 동시에 blocking 호출을 실행합니다.
    pub fn new(inner: F, max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            inner: Arc::new(inner),
            workers: Arc::new(Semaphore::new(max_workers)),
            max_workers,
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }
}

#[async_trait]
impl<F: BlockingFetch> Fetch for OnWorkerPool<F> {
    async fn fetch(&self, entity: &str, window: &SyncWindow) -> Result<Option<Table>> {
        let _worker = self
            .workers
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| SyncError::Worker("worker pool closed".to_string()))?;

        let inner = self.inner.clone();
        let entity = entity.to_string();
        let window = *window;

        let result =
            tokio::task::spawn_blocking(move || inner.fetch_blocking(&entity, &window)).await?;
        result
    }

    fn reset(&self) {
        self.inner.reset();
    }
}

/// 재시도 포함 조회 결과.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    /// 새 데이터
    Data(Table),
    /// 조회 성공, 데이터 없음
    Empty,
    /// 재시도 소진
    Failed,
    /// 취소 요청으로 중단
    Cancelled,
}

/// 재시도 + 재연결 포함 조회.
///
/// 재시도가 모두 실패하면 `Fetch::reset()`을 호출해 다음 호출자가 새 세션을 쓰도록 합니다.
pub async fn fetch_with_retry(
    fetcher: &dyn Fetch,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    entity: &str,
    window: &SyncWindow,
) -> Fetched {
    let label = format!("fetch:{}", entity);

    match call_with_retry(policy, cancel, &label, |_| fetcher.fetch(entity, window)).await {
        Some(Some(table)) if !table.is_empty() => Fetched::Data(table),
        Some(_) => {
            debug!(entity = entity, window = %window, "데이터 없음");
            Fetched::Empty
        }
        None if cancel.is_cancelled() => Fetched::Cancelled,
        None => {
            warn!(entity = entity, window = %window, "조회 최종 실패, 세션 재생성");
            fetcher.reset();
            Fetched::Failed
        }
    }
}
