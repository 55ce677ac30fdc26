//! Standalone incremental data collector.
//!
//! `trader-sync` 엔진에 다음 협력자를 연결합니다:
//! - PostgreSQL 저장소 (`PgStore`)
//! - KRX 데이터 소스 (종목 목록, 일봉)
//! - 동기화 함수 등록 (`stock_list`, `stock_daily`)

pub mod config;
pub mod error;
pub mod functions;
pub mod krx;
pub mod store;

pub use config::CollectorConfig;
pub use error::{CollectorError, Result};
pub use krx::{KrxClient, KrxDailyFetcher, KrxListingFetcher};
pub use store::PgStore;
