//! 증분 동기화 엔진.
//!
//! 이 crate는 다음을 제공합니다:
//! - 거래일 캘린더 기반 "이미 최신인가?" 판단 (`decision`)
//! - 재시도/재연결 래퍼 (`retry`)
//! - 수집(fetch) 게이트와 저장(save) 게이트를 분리한 2단계 스케줄러 (`orchestrator`)
//! - 종목 단위 작업과 상태 머신 (`task`, `jobs`)
//! - 저장소/데이터 소스 협력자 인터페이스 (`store`, `fetch`)
//!
//! # 동작 흐름
//!
//! ```text
//! DataSync::sync()
//!     │
//!     ▼
//! prepare_tasks() ── 실패 시 전체 실행 중단
//!     │
//!     ▼
//! fetch gate 획득 ──► Task::run() ──► is_synced? ──► fetch (retry) ──► submit_db()
//!     │                                                                    │
//!     │                                                        save gate 획득 ──► Store::save()
//!     ▼
//! fetch gate join ──► save gate join ──► SyncReport
//! ```

pub mod calendar;
pub mod decision;
pub mod error;
pub mod fetch;
pub mod gate;
pub mod jobs;
pub mod logging;
pub mod model;
pub mod orchestrator;
pub mod pool;
pub mod retry;
pub mod stats;
pub mod store;
pub mod task;

pub use calendar::{TradeCalendar, WeekdayCalendar};
pub use decision::{default_cutoff, diff_by_key, is_synced, market_close_cutoff, Cutoff};
pub use error::{Result, SyncError};
pub use fetch::{fetch_with_retry, BlockingFetch, Fetch, Fetched, OnWorkerPool};
pub use gate::{Gate, GatePermit};
pub use jobs::{CatalogFunction, CatalogJob, TimeSeriesFunction, TimeSeriesJob, Universe};
pub use logging::{init_logging, LogConfig, LogFormat};
pub use model::{Key, KeyField, Row, SyncWindow, Table};
pub use orchestrator::{market_clock, Clock, DataSync, SyncFunction, SyncOptions, SyncServices};
pub use pool::{PooledSession, SessionPool};
pub use retry::{call_with_retry, RetryPolicy, MAX_BACKOFF};
pub use stats::{RunCounters, SyncReport};
pub use store::{MemoryStore, Store};
pub use task::{JobOutcome, SyncJob, Task, TaskContext, TaskState};
