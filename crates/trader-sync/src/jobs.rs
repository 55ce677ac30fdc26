//! 기본 제공 동기화 함수.
//!
//! - [`TimeSeriesFunction`]: 종목별 일봉 등 시계열 데이터. 마커(마지막 거래일자) 이후 구간만 수집.
//! - [`CatalogFunction`]: 종목 목록 등 카탈로그 데이터. 저장된 키 집합과 비교해 새 항목만 저장.

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::decision::{diff_by_key, is_synced};
use crate::error::{Result, SyncError};
use crate::fetch::{fetch_with_retry, Fetch, Fetched};
use crate::model::{Key, KeyField, SyncWindow, Table};
use crate::orchestrator::{SyncFunction, SyncServices};
use crate::store::Store;
use crate::task::{JobOutcome, SyncJob, Task, TaskContext};

/// 동기화 대상 종목 집합.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Universe {
    /// 고정 목록
    Fixed(Vec<String>),
    /// 카탈로그 데이터셋에 저장된 종목코드 전체
    Catalog { dataset: String },
}

impl Universe {
    /// 종목 목록 조회 (종목코드 순).
    pub async fn resolve(&self, store: &dyn Store) -> Result<Vec<String>> {
        match self {
            Universe::Fixed(codes) => Ok(codes.clone()),
            Universe::Catalog { dataset } => {
                let keys = store.load_key_set(dataset, KeyField::Code).await?;
                let mut codes: Vec<String> = keys
                    .into_iter()
                    .filter_map(|key| match key {
                        Key::Code(code) => Some(code),
                        Key::Date(_) => None,
                    })
                    .collect();
                codes.sort();
                Ok(codes)
            }
        }
    }
}

// ==================== 시계열 ====================

/// 시계열 동기화 함수.
pub struct TimeSeriesFunction {
    name: String,
    dataset: String,
    universe: Universe,
    fetcher: Arc<dyn Fetch>,
    history_days: Option<i64>,
}

impl TimeSeriesFunction {
    pub fn new(
        name: impl Into<String>,
        dataset: impl Into<String>,
        universe: Universe,
        fetcher: Arc<dyn Fetch>,
    ) -> Self {
        Self {
            name: name.into(),
            dataset: dataset.into(),
            universe,
            fetcher,
            history_days: None,
        }
    }

    /// 한 번도 동기화되지 않은 종목의 수집 시작일 (오늘 기준 며칠 전).
    pub fn with_history_days(mut self, days: i64) -> Self {
        self.history_days = Some(days);
        self
    }
}

#[async_trait]
impl SyncFunction for TimeSeriesFunction {
    fn name(&self) -> &str {
        &self.name
    }

    async fn prepare(&self, services: &SyncServices) -> Result<Vec<Task>> {
        let entities = self
            .universe
            .resolve(services.store.as_ref())
            .await
            .map_err(|e| SyncError::prepare(&self.name, e))?;

        if entities.is_empty() {
            warn!(function = %self.name, universe = ?self.universe, "동기화 대상 종목 없음");
        }

        Ok(entities
            .into_iter()
            .map(|entity| {
                let job = TimeSeriesJob {
                    function: self.name.clone(),
                    dataset: self.dataset.clone(),
                    entity,
                    fetcher: self.fetcher.clone(),
                    history_days: self.history_days,
                };
                Task::new(format!("{}:{}", self.name, job.entity), job)
            })
            .collect())
    }
}

/// 시계열 종목 작업.
pub struct TimeSeriesJob {
    function: String,
    dataset: String,
    entity: String,
    fetcher: Arc<dyn Fetch>,
    history_days: Option<i64>,
}

#[async_trait]
impl SyncJob for TimeSeriesJob {
    fn function(&self) -> &str {
        &self.function
    }

    fn entity(&self) -> &str {
        &self.entity
    }

    async fn run(&self, ctx: &TaskContext) -> Result<JobOutcome> {
        let services = ctx.services();
        let now = ctx.now();

        let marker = services
            .store
            .load_marker(&self.dataset, &self.entity, KeyField::TradeDate)
            .await?
            .and_then(|row| row.trade_date);

        let window = SyncWindow::after_marker(marker, now);
        if is_synced(
            services.calendar.as_ref(),
            window.start,
            window.end,
            now,
            services.cutoff.as_ref(),
        ) {
            debug!(window = %window, "이미 최신");
            return Ok(JobOutcome::UpToDate);
        }

        let window = match (window.start, self.history_days) {
            (None, Some(days)) => SyncWindow::new(Some(history_start(window.end, days)), window.end),
            _ => window,
        };

        let table = match fetch_with_retry(
            self.fetcher.as_ref(),
            &services.retry,
            ctx.cancel_token(),
            &self.entity,
            &window,
        )
        .await
        {
            Fetched::Data(table) => table,
            Fetched::Empty => return Ok(JobOutcome::NoData),
            Fetched::Failed => return Ok(JobOutcome::FetchFailed),
            Fetched::Cancelled => return Ok(JobOutcome::Cancelled),
        };

        let rows = after_marker(table, marker);
        if rows.is_empty() {
            return Ok(JobOutcome::NoData);
        }

        let count = rows.len();
        debug!(window = %window, rows = count, "저장 제출");

        let store = services.store.clone();
        let dataset = self.dataset.clone();
        let entity = self.entity.clone();
        ctx.submit_db(&self.entity, async move { store.save(&dataset, &entity, rows).await })
            .await?;

        Ok(JobOutcome::Submitted { rows: count })
    }
}

/// 최초 수집 시작일. 범위를 벗어나면 표현 가능한 가장 이른 날짜.
fn history_start(end: NaiveDate, days: i64) -> NaiveDate {
    end.checked_sub_days(Days::new(days.max(0).unsigned_abs()))
        .unwrap_or(NaiveDate::MIN)
}

/// 마커 이후 거래일자의 행만 남김 (거래일자가 없는 행은 제외).
///
/// 거래일자 오름차순으로 정렬합니다. 저장이 중간에 실패해도 마커가
/// 저장되지 않은 행을 건너뛰지 않습니다.
fn after_marker(table: Table, marker: Option<NaiveDate>) -> Table {
    let mut rows: Table = table
        .into_iter()
        .filter(|row| match (row.trade_date, marker) {
            (Some(date), Some(marker)) => date > marker,
            (Some(_), None) => true,
            (None, _) => false,
        })
        .collect();
    rows.sort_by_key(|row| row.trade_date);
    rows
}

// ==================== 카탈로그 ====================

/// 카탈로그 동기화 함수.
///
/// `segments`(예: 시장 구분)마다 작업 하나를 만듭니다.
pub struct CatalogFunction {
    name: String,
    dataset: String,
    segments: Vec<String>,
    fetcher: Arc<dyn Fetch>,
}

impl CatalogFunction {
    pub fn new(
        name: impl Into<String>,
        dataset: impl Into<String>,
        segments: Vec<String>,
        fetcher: Arc<dyn Fetch>,
    ) -> Self {
        Self {
            name: name.into(),
            dataset: dataset.into(),
            segments,
            fetcher,
        }
    }
}

#[async_trait]
impl SyncFunction for CatalogFunction {
    fn name(&self) -> &str {
        &self.name
    }

    async fn prepare(&self, _services: &SyncServices) -> Result<Vec<Task>> {
        info!(function = %self.name, segments = ?self.segments, "카탈로그 작업 준비");

        Ok(self
            .segments
            .iter()
            .map(|segment| {
                let job = CatalogJob {
                    function: self.name.clone(),
                    dataset: self.dataset.clone(),
                    segment: segment.clone(),
                    fetcher: self.fetcher.clone(),
                };
                Task::new(format!("{}:{}", self.name, segment), job)
            })
            .collect())
    }
}

/// 카탈로그 구간 작업.
pub struct CatalogJob {
    function: String,
    dataset: String,
    segment: String,
    fetcher: Arc<dyn Fetch>,
}

#[async_trait]
impl SyncJob for CatalogJob {
    fn function(&self) -> &str {
        &self.function
    }

    fn entity(&self) -> &str {
        &self.segment
    }

    async fn run(&self, ctx: &TaskContext) -> Result<JobOutcome> {
        let services = ctx.services();
        let today = ctx.now().date();

        let stored = services
            .store
            .load_key_set(&self.dataset, KeyField::Code)
            .await?;

        let window = SyncWindow::new(Some(today), today);
        let table = match fetch_with_retry(
            self.fetcher.as_ref(),
            &services.retry,
            ctx.cancel_token(),
            &self.segment,
            &window,
        )
        .await
        {
            Fetched::Data(table) => table,
            Fetched::Empty => return Ok(JobOutcome::NoData),
            Fetched::Failed => return Ok(JobOutcome::FetchFailed),
            Fetched::Cancelled => return Ok(JobOutcome::Cancelled),
        };

        let fetched = table.len();
        let Some(fresh) = diff_by_key(&stored, table, |row| row.key(KeyField::Code)) else {
            debug!(fetched = fetched, "새 항목 없음");
            return Ok(JobOutcome::NoData);
        };

        let count = fresh.len();
        info!(fetched = fetched, new = count, "새 항목 발견");

        let store = services.store.clone();
        let dataset = self.dataset.clone();
        let segment = self.segment.clone();
        ctx.submit_db(&self.segment, async move {
            store.save(&dataset, &segment, fresh).await
        })
        .await?;

        Ok(JobOutcome::Submitted { rows: count })
    }
}
