//! 종목 단위 작업.
//!
//! 작업 하나는 한 종목에 대해 "판단 → 수집 → 저장 제출"을 수행합니다.
//! 상태는 `Pending → Running → Done` 순서로만 전이하며, 작업 오류나 panic이 발생해도
//! 로그와 카운터에 기록된 뒤 `Done`에 도달합니다.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, Instrument};

use crate::error::{Result, SyncError};
use crate::gate::Gate;
use crate::orchestrator::SyncServices;
use crate::stats::RunCounters;

/// 작업 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    Pending = 0,
    Running = 1,
    Done = 2,
}

impl TaskState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => TaskState::Pending,
            1 => TaskState::Running,
            _ => TaskState::Done,
        }
    }
}

/// 작업 실행 결과.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// 이미 최신 (수집 생략)
    UpToDate,
    /// 조회 성공, 저장할 새 데이터 없음
    NoData,
    /// 저장 작업 제출됨
    Submitted { rows: usize },
    /// 재시도 소진
    FetchFailed,
    /// 취소 요청으로 중단
    Cancelled,
}

/// 종목 하나에 대한 동기화 로직.
#[async_trait]
pub trait SyncJob: Send + Sync {
    /// 이 작업을 만든 동기화 함수 이름.
    fn function(&self) -> &str;

    /// 대상 종목.
    fn entity(&self) -> &str;

    async fn run(&self, ctx: &TaskContext) -> Result<JobOutcome>;
}

/// 동기화 작업.
///
/// 복제본은 상태를 공유합니다.
#[derive(Clone)]
pub struct Task {
    name: String,
    job: Arc<dyn SyncJob>,
    state: Arc<AtomicU8>,
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

impl Task {
    pub fn new(name: impl Into<String>, job: impl SyncJob + 'static) -> Self {
        Self::from_arc(name, Arc::new(job))
    }

    pub fn from_arc(name: impl Into<String>, job: Arc<dyn SyncJob>) -> Self {
        Self {
            name: name.into(),
            job,
            state: Arc::new(AtomicU8::new(TaskState::Pending as u8)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn function(&self) -> &str {
        self.job.function()
    }

    pub fn entity(&self) -> &str {
        self.job.entity()
    }

    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: TaskState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// 작업 실행. 오류와 panic은 여기서 처리되며 호출자에게 전파되지 않습니다.
    pub async fn run(&self, ctx: &TaskContext) -> JobOutcome {
        self.set_state(TaskState::Running);

        let span = tracing::info_span!(
            "task",
            function = self.job.function(),
            entity = self.job.entity()
        );
        let result = AssertUnwindSafe(self.job.run(ctx).instrument(span))
            .catch_unwind()
            .await;

        let outcome = match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(SyncError::Cancelled)) => JobOutcome::Cancelled,
            Ok(Err(e)) => {
                error!(task = %self.name, error = %e, "작업 실패");
                RunCounters::incr(&ctx.counters.task_failed);
                self.set_state(TaskState::Done);
                return JobOutcome::NoData;
            }
            Err(panic) => {
                error!(task = %self.name, panic = %panic_message(&*panic), "작업 panic");
                RunCounters::incr(&ctx.counters.task_failed);
                self.set_state(TaskState::Done);
                return JobOutcome::NoData;
            }
        };

        ctx.record(outcome);
        debug!(task = %self.name, outcome = ?outcome, "작업 완료");
        self.set_state(TaskState::Done);
        outcome
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// 작업 실행 컨텍스트.
///
/// 공용 서비스(저장소, 캘린더, 시계, 재시도 정책), 저장 게이트, 취소 토큰,
/// 실행 카운터를 담습니다.
#[derive(Clone)]
pub struct TaskContext {
    services: Arc<SyncServices>,
    save_gate: Arc<Gate>,
    cancel: CancellationToken,
    counters: Arc<RunCounters>,
}

impl TaskContext {
    pub fn new(
        services: Arc<SyncServices>,
        save_gate: Arc<Gate>,
        cancel: CancellationToken,
        counters: Arc<RunCounters>,
    ) -> Self {
        Self {
            services,
            save_gate,
            cancel,
            counters,
        }
    }

    pub fn services(&self) -> &SyncServices {
        &self.services
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn counters(&self) -> &RunCounters {
        &self.counters
    }

    /// 현재 시각 (서비스 시계 기준).
    pub fn now(&self) -> NaiveDateTime {
        (self.services.clock)()
    }

    /// 저장 작업 제출.
    ///
    /// 저장 게이트 슬롯을 획득할 때까지 대기한 뒤 저장을 별도 작업으로 실행하고 즉시 반환합니다.
    /// 저장 결과는 제출한 작업과 무관하게 카운터(`rows_saved`, `save_failed`)에 기록됩니다.
    pub async fn submit_db<F>(&self, entity: &str, save: F) -> Result<()>
    where
        F: Future<Output = Result<usize>> + Send + 'static,
    {
        let permit = self.save_gate.acquire(&self.cancel).await?;
        RunCounters::incr(&self.counters.saves_submitted);

        let counters = self.counters.clone();
        let entity = entity.to_string();
        self.save_gate.spawn(permit, async move {
            match AssertUnwindSafe(save).catch_unwind().await {
                Ok(Ok(rows)) => {
                    counters.rows_saved.fetch_add(rows, Ordering::Relaxed);
                    debug!(entity = %entity, rows = rows, "저장 완료");
                }
                Ok(Err(e)) => {
                    RunCounters::incr(&counters.save_failed);
                    error!(entity = %entity, error = %e, "저장 실패");
                }
                Err(panic) => {
                    RunCounters::incr(&counters.save_failed);
                    error!(entity = %entity, panic = %panic_message(&*panic), "저장 작업 panic");
                }
            }
        });

        Ok(())
    }

    fn record(&self, outcome: JobOutcome) {
        let counter = match outcome {
            JobOutcome::UpToDate => &self.counters.up_to_date,
            JobOutcome::NoData => &self.counters.empty,
            JobOutcome::Submitted { .. } => &self.counters.fetched,
            JobOutcome::FetchFailed => &self.counters.fetch_failed,
            JobOutcome::Cancelled => &self.counters.cancelled,
        };
        RunCounters::incr(counter);
    }
}
