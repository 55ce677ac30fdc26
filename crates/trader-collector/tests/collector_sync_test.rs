//! KRX 데이터 소스 + 동기화 엔진 통합 테스트.
//!
//! mockito 서버를 KRX로, MemoryStore를 PostgreSQL 대신 사용합니다.

use chrono::NaiveDate;
use mockito::Matcher;
use std::sync::Arc;
use trader_collector::{functions, CollectorConfig, KrxClient};
use trader_sync::{KeyField, MemoryStore, Store};

const JSON_PATH: &str = "/comm/bldAttendant/getJsonData.cmd";

fn config(base_url: &str) -> CollectorConfig {
    let base_url = base_url.to_string();
    CollectorConfig::from_lookup(move |key| match key {
        "DATABASE_URL" => Some("postgres://localhost/trader".to_string()),
        "KRX_BASE_URL" => Some(base_url.clone()),
        "SYNC_RETRY_MAX_ATTEMPTS" => Some("1".to_string()),
        "SYNC_HISTORY_DAYS" => Some("5".to_string()),
        _ => None,
    })
    .unwrap()
}

#[tokio::test]
async fn test_listing_then_daily() {
    let mut server = mockito::Server::new_async().await;

    let kospi = server
        .mock("POST", JSON_PATH)
        .match_body(Matcher::UrlEncoded("mktId".into(), "STK".into()))
        .with_status(200)
        .with_body(r#"{"OutBlock_1":[{"ISU_SRT_CD":"005930","ISU_ABBRV":"삼성전자"}]}"#)
        .expect_at_least(1)
        .create_async()
        .await;
    let kosdaq = server
        .mock("POST", JSON_PATH)
        .match_body(Matcher::UrlEncoded("mktId".into(), "KSQ".into()))
        .with_status(200)
        .with_body(r#"{"OutBlock_1":[{"ISU_SRT_CD":"247540","ISU_ABBRV":"에코프로비엠"}]}"#)
        .expect_at_least(1)
        .create_async()
        .await;
    let daily = server
        .mock("POST", JSON_PATH)
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("strtDd".into(), "20240105".into()),
            Matcher::UrlEncoded("endDd".into(), "20240110".into()),
        ]))
        .with_status(200)
        .with_body(
            r#"{"output":[
                {"TRD_DD":"2024/01/10","TDD_OPNPRC":"100","TDD_HGPRC":"110","TDD_LWPRC":"90","TDD_CLSPRC":"105","ACC_TRDVOL":"1,000","ACC_TRDVAL":"105,000"},
                {"TRD_DD":"2024/01/09","TDD_OPNPRC":"98","TDD_HGPRC":"101","TDD_LWPRC":"97","TDD_CLSPRC":"100","ACC_TRDVOL":"800","ACC_TRDVAL":"80,000"}
            ]}"#,
        )
        .expect(2)
        .create_async()
        .await;

    let config = config(&server.url());
    let store = Arc::new(MemoryStore::new());
    let now = NaiveDate::from_ymd_opt(2024, 1, 10)
        .unwrap()
        .and_hms_opt(16, 0, 0)
        .unwrap();

    let services = functions::services(store.clone(), &config.sync)
        .unwrap()
        .with_clock(Arc::new(move || now));
    let client = Arc::new(KrxClient::new(&config.krx.base_url, 2));
    let sync = functions::build_sync(services, client, &config.sync);

    // 1회차: 종목 목록만 저장됨 (일봉 대상 없음)
    let first = sync.sync().await.unwrap();
    assert_eq!(first.total, 2);
    assert_eq!(first.rows_saved, 2);
    assert_eq!(store.rows(functions::STOCK_LIST).await.len(), 2);

    // 2회차: 목록 변화 없음, 두 종목 일봉 최초 수집
    let second = sync.sync().await.unwrap();
    assert_eq!(second.total, 4);
    assert_eq!(second.empty, 2);
    assert_eq!(second.rows_saved, 4);
    assert!(!second.has_failures());

    let marker = store
        .load_marker(functions::STOCK_DAILY, "005930", KeyField::TradeDate)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(marker.trade_date, NaiveDate::from_ymd_opt(2024, 1, 10));
    assert_eq!(marker.fields["close"], "105");

    // 3회차: 일봉은 이미 최신
    let third = sync.sync().await.unwrap();
    assert_eq!(third.up_to_date, 2);

    kospi.assert_async().await;
    kosdaq.assert_async().await;
    daily.assert_async().await;
}

#[tokio::test]
async fn test_unreachable_source_is_counted() {
    let mut server = mockito::Server::new_async().await;
    let _down = server
        .mock("POST", JSON_PATH)
        .with_status(502)
        .create_async()
        .await;

    let config = config(&server.url());
    let store = Arc::new(MemoryStore::new());
    let services = functions::services(store.clone(), &config.sync).unwrap();
    let client = Arc::new(KrxClient::new(&config.krx.base_url, 1));
    let sync = functions::build_sync(services, client.clone(), &config.sync);

    let report = sync.sync().await.unwrap();
    assert_eq!(report.fetch_failed, 2);
    assert!(report.has_failures());
    assert!(store.rows(functions::STOCK_LIST).await.is_empty());
}
