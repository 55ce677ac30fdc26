//! 동기화 함수 등록.
//!
//! | 이름 | 종류 | 대상 |
//! |------|------|------|
//! | `stock_list` | 카탈로그 | KOSPI(`STK`), KOSDAQ(`KSQ`) 종목 목록 |
//! | `stock_daily` | 시계열 | `stock_list`에 저장된 전 종목의 일봉 |

use std::sync::Arc;
use trader_sync::{
    CatalogFunction, DataSync, Store, SyncServices, TimeSeriesFunction, Universe,
};

use crate::config::SyncConfig;
use crate::krx::{KrxClient, KrxDailyFetcher, KrxListingFetcher};
use crate::Result;

pub const STOCK_LIST: &str = "stock_list";
pub const STOCK_DAILY: &str = "stock_daily";

/// 등록되는 함수 이름 (실행 순서).
pub const FUNCTIONS: [&str; 2] = [STOCK_LIST, STOCK_DAILY];

/// 종목 목록을 수집하는 시장 구분.
pub const MARKETS: [&str; 2] = ["STK", "KSQ"];

/// 설정으로 공용 서비스 구성.
pub fn services(store: Arc<dyn Store>, config: &SyncConfig) -> Result<SyncServices> {
    Ok(SyncServices::new(store, Arc::new(config.calendar()?))
        .with_cutoff(config.cutoff())
        .with_clock(config.clock())
        .with_retry(config.retry_policy()))
}

/// 모든 동기화 함수를 등록한 오케스트레이터 생성.
pub fn build_sync(services: SyncServices, client: Arc<KrxClient>, config: &SyncConfig) -> DataSync {
    let mut sync = DataSync::new(services, config.options());

    sync.register(CatalogFunction::new(
        STOCK_LIST,
        STOCK_LIST,
        MARKETS.iter().map(|m| m.to_string()).collect(),
        Arc::new(KrxListingFetcher::new(client.clone())),
    ));

    sync.register(
        TimeSeriesFunction::new(
            STOCK_DAILY,
            STOCK_DAILY,
            Universe::Catalog {
                dataset: STOCK_LIST.to_string(),
            },
            Arc::new(KrxDailyFetcher::new(client)),
        )
        .with_history_days(config.history_days),
    );

    sync
}
