//! 동기화 오케스트레이터.
//!
//! 등록된 동기화 함수로 작업 목록을 만들고, fetch 게이트와 save 게이트로 동시 실행을
//! 제한하며 실행합니다. 두 게이트가 모두 비워지면 실행이 끝납니다.

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use chrono_tz::Tz;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::calendar::TradeCalendar;
use crate::decision::{default_cutoff, Cutoff};
use crate::error::{Result, SyncError};
use crate::gate::Gate;
use crate::retry::RetryPolicy;
use crate::stats::{RunCounters, SyncReport};
use crate::store::Store;
use crate::task::{Task, TaskContext};

/// 현재 시각(시장 시간대, timezone 정보 없음)을 반환하는 함수.
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// 시장 시간대 기준 시계.
pub fn market_clock(tz: Tz) -> Clock {
    Arc::new(move || Utc::now().with_timezone(&tz).naive_local())
}

/// 작업들이 공유하는 서비스.
#[derive(Clone)]
pub struct SyncServices {
    pub store: Arc<dyn Store>,
    pub calendar: Arc<dyn TradeCalendar>,
    pub cutoff: Cutoff,
    pub clock: Clock,
    pub retry: RetryPolicy,
}

impl SyncServices {
    /// 기본 설정 (15:30 마감, 서울 시간대, 3회 재시도).
    pub fn new(store: Arc<dyn Store>, calendar: Arc<dyn TradeCalendar>) -> Self {
        Self {
            store,
            calendar,
            cutoff: Arc::new(default_cutoff),
            clock: market_clock(chrono_tz::Asia::Seoul),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_cutoff(mut self, cutoff: Cutoff) -> Self {
        self.cutoff = cutoff;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn now(&self) -> NaiveDateTime {
        (self.clock)()
    }
}

/// 이름으로 선택 가능한 작업 생성기.
#[async_trait]
pub trait SyncFunction: Send + Sync {
    fn name(&self) -> &str;

    /// 대상 종목을 열거해 작업 목록 생성.
    async fn prepare(&self, services: &SyncServices) -> Result<Vec<Task>>;
}

/// 실행 옵션.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// 동시 수집 작업 수
    pub fetch_concurrency: usize,
    /// 동시 저장 작업 수
    pub save_concurrency: usize,
    /// 실행할 함수 이름 (쉼표 구분). None이면 전체.
    pub functions: Option<String>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            fetch_concurrency: 8,
            save_concurrency: 4,
            functions: None,
        }
    }
}

impl SyncOptions {
    /// 함수 이름 필터.
    pub fn function_filter(&self) -> Option<HashSet<String>> {
        self.functions.as_ref().map(|names| {
            names
                .split(',')
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect()
        })
    }
}

/// 증분 동기화 오케스트레이터.
pub struct DataSync {
    services: Arc<SyncServices>,
    options: SyncOptions,
    functions: Vec<Arc<dyn SyncFunction>>,
    cancel: CancellationToken,
}

impl DataSync {
    pub fn new(services: SyncServices, options: SyncOptions) -> Self {
        Self {
            services: Arc::new(services),
            options,
            functions: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// 동기화 함수 등록.
    pub fn register(&mut self, function: impl SyncFunction + 'static) -> &mut Self {
        self.functions.push(Arc::new(function));
        self
    }

    /// 동기화 함수 등록 (builder).
    pub fn with_function(mut self, function: impl SyncFunction + 'static) -> Self {
        self.register(function);
        self
    }

    /// 등록된 함수 이름 (등록 순).
    pub fn function_names(&self) -> Vec<&str> {
        self.functions.iter().map(|f| f.name()).collect()
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn services(&self) -> &SyncServices {
        &self.services
    }

    /// 실행 취소용 토큰. 취소하면 남은 작업 스케줄을 중단합니다.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn selected_functions(&self) -> Vec<Arc<dyn SyncFunction>> {
        let Some(filter) = self.options.function_filter() else {
            return self.functions.clone();
        };

        let known: HashSet<&str> = self.function_names().into_iter().collect();
        for name in &filter {
            if !known.contains(name.as_str()) {
                warn!(function = %name, "등록되지 않은 동기화 함수, 무시");
            }
        }

        self.functions
            .iter()
            .filter(|f| filter.contains(f.name()))
            .cloned()
            .collect()
    }

    /// 선택된 함수들의 작업 목록 생성.
    ///
    /// 하나라도 실패하면 작업을 스케줄하기 전에 전체 실행을 중단합니다.
    pub async fn prepare_tasks(&self) -> Result<Vec<Task>> {
        let mut tasks = Vec::new();

        for function in self.selected_functions() {
            let prepared = function.prepare(&self.services).await.map_err(|e| match e {
                SyncError::Prepare { .. } => e,
                other => SyncError::prepare(function.name(), other),
            });

            match prepared {
                Ok(mut list) => {
                    info!(function = function.name(), tasks = list.len(), "작업 준비 완료");
                    tasks.append(&mut list);
                }
                Err(e) => {
                    error!(function = function.name(), error = %e, "작업 준비 실패, 실행 중단");
                    return Err(e);
                }
            }
        }

        Ok(tasks)
    }

    /// 한 번의 동기화 실행.
    pub async fn sync(&self) -> Result<SyncReport> {
        let started = Instant::now();
        let tasks = self.prepare_tasks().await?;
        let total = tasks.len();

        let fetch_gate = Arc::new(Gate::new("fetch", self.options.fetch_concurrency));
        let save_gate = Arc::new(Gate::new("save", self.options.save_concurrency));
        let counters = Arc::new(RunCounters::new());
        let ctx = TaskContext::new(
            self.services.clone(),
            save_gate.clone(),
            self.cancel.clone(),
            counters.clone(),
        );

        info!(
            tasks = total,
            fetch_concurrency = fetch_gate.capacity(),
            save_concurrency = save_gate.capacity(),
            "동기화 시작"
        );

        let mut not_scheduled = 0;
        for (index, task) in tasks.into_iter().enumerate() {
            let permit = match fetch_gate.acquire(&self.cancel).await {
                Ok(permit) => permit,
                Err(e) => {
                    not_scheduled = total - index;
                    warn!(error = %e, remaining = not_scheduled, "작업 스케줄 중단");
                    break;
                }
            };

            let ctx = ctx.clone();
            fetch_gate.spawn(permit, async move {
                task.run(&ctx).await;
            });
        }

        fetch_gate.join().await;
        save_gate.join().await;

        let mut report = counters.snapshot(total, not_scheduled, started.elapsed());
        report.fetch_peak = fetch_gate.peak();
        report.save_peak = save_gate.peak();
        Ok(report)
    }
}
