//! KRX(한국거래소) 데이터 소스.
//!
//! KRX 정보데이터시스템(`getJsonData.cmd`)에서 다음을 조회합니다:
//! - 개별종목 일별 시세 (`MDCSTAT01701`) → [`KrxDailyFetcher`]
//! - 시장별 전종목 목록 (`MDCSTAT01501`) → [`KrxListingFetcher`]
//!
//! HTTP 클라이언트는 [`SessionPool`]에 보관하며, 재시도가 모두 실패하면 풀 전체를 재생성합니다.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use trader_sync::{Fetch, Result, Row, SessionPool, SyncError, SyncWindow, Table};

/// JSON 조회 경로.
const JSON_PATH: &str = "/comm/bldAttendant/getJsonData.cmd";

/// 개별종목 시세 조회 bld.
const BLD_STOCK_OHLCV: &str = "dbms/MDC/STAT/standard/MDCSTAT01701";

/// 전종목 목록 조회 bld.
const BLD_MARKET_LISTING: &str = "dbms/MDC/STAT/standard/MDCSTAT01501";

const REFERER: &str = "https://data.krx.co.kr/contents/MDC/MDI/outerLoader/index.cmd";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// 시작일이 없는 구간의 기본 조회 기간 (일).
const FALLBACK_HISTORY_DAYS: i64 = 365;

// ==================== 클라이언트 ====================

/// KRX HTTP 클라이언트.
pub struct KrxClient {
    endpoint: String,
    sessions: SessionPool<reqwest::Client>,
}

impl KrxClient {
    /// `base_url`은 스킴과 호스트만 포함합니다 (예: `https://data.krx.co.kr`).
    pub fn new(base_url: &str, pool_size: usize) -> Self {
        let endpoint = format!("{}{}", base_url.trim_end_matches('/'), JSON_PATH);
        let sessions = SessionPool::new(pool_size, || {
            reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .map_err(|e| SyncError::Session(format!("HTTP 클라이언트 생성 실패: {}", e)))
        });

        Self { endpoint, sessions }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn sessions(&self) -> &SessionPool<reqwest::Client> {
        &self.sessions
    }

    /// 세션 전체 재생성.
    pub fn reset(&self) {
        warn!("KRX 세션 재생성");
        self.sessions.reset_all();
    }

    /// form POST 후 JSON 응답 파싱.
    async fn post_json<T: DeserializeOwned>(&self, params: &[(&str, &str)]) -> Result<T> {
        let session = self.sessions.checkout()?;

        let response = session
            .post(&self.endpoint)
            .header("Referer", REFERER)
            .form(params)
            .send()
            .await
            .map_err(|e| SyncError::Fetch(format!("KRX API 호출 실패: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Fetch(format!("KRX API 오류: {}", status)));
        }

        let text = response
            .text()
            .await
            .map_err(|e| SyncError::Fetch(format!("응답 읽기 실패: {}", e)))?;

        debug!(slot = session.slot(), response_len = text.len(), "KRX API 응답 수신");

        serde_json::from_str(&text).map_err(|e| {
            let preview: String = text.chars().take(200).collect();
            SyncError::InvalidData(format!("JSON 파싱 실패: {} - {}", e, preview))
        })
    }
}

// ==================== 일별 시세 ====================

#[derive(Debug, Deserialize)]
struct OhlcvResponse {
    #[serde(default)]
    output: Vec<OhlcvRecord>,
}

#[derive(Debug, Deserialize)]
struct OhlcvRecord {
    #[serde(rename = "TRD_DD", default)]
    trd_dd: String,
    #[serde(rename = "TDD_OPNPRC", default)]
    open: String,
    #[serde(rename = "TDD_HGPRC", default)]
    high: String,
    #[serde(rename = "TDD_LWPRC", default)]
    low: String,
    #[serde(rename = "TDD_CLSPRC", default)]
    close: String,
    #[serde(rename = "ACC_TRDVOL", default)]
    volume: String,
    #[serde(rename = "ACC_TRDVAL", default)]
    value: String,
}

/// 개별종목 일봉 데이터 소스.
pub struct KrxDailyFetcher {
    client: Arc<KrxClient>,
}

impl KrxDailyFetcher {
    pub fn new(client: Arc<KrxClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetch for KrxDailyFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, entity: &str, window: &SyncWindow) -> Result<Option<Table>> {
        let start = window
            .start
            .unwrap_or(window.end - Duration::days(FALLBACK_HISTORY_DAYS));
        let start = start.format("%Y%m%d").to_string();
        let end = window.end.format("%Y%m%d").to_string();

        // 단축코드로 ISIN 구성 (KR7 + 종목코드 + 003)
        let isin = format!("KR7{}003", entity);
        let params = [
            ("bld", BLD_STOCK_OHLCV),
            ("isuCd", isin.as_str()),
            ("strtDd", start.as_str()),
            ("endDd", end.as_str()),
            ("adjStkPrc", "2"),
        ];

        let response: OhlcvResponse = self.client.post_json(&params).await?;
        let rows = ohlcv_rows(entity, &response.output)?;

        debug!(entity = entity, count = rows.len(), "KRX 일봉 조회 완료");
        Ok(if rows.is_empty() { None } else { Some(rows) })
    }

    fn reset(&self) {
        self.client.reset();
    }
}

/// 시세 레코드를 행으로 변환 (거래일자 오름차순, 종가 0 제외).
fn ohlcv_rows(code: &str, records: &[OhlcvRecord]) -> Result<Table> {
    let mut rows = Vec::with_capacity(records.len());

    for record in records {
        let date = parse_krx_date(&record.trd_dd)?;
        let close = parse_krx_number(&record.close)?;
        if close.is_zero() {
            continue;
        }

        rows.push(
            Row::bar(code, date)
                .with_field("open", parse_krx_number(&record.open)?.to_string())
                .with_field("high", parse_krx_number(&record.high)?.to_string())
                .with_field("low", parse_krx_number(&record.low)?.to_string())
                .with_field("close", close.to_string())
                .with_field("volume", parse_krx_number(&record.volume)?.to_string())
                .with_field("value", parse_krx_number(&record.value)?.to_string()),
        );
    }

    rows.sort_by_key(|row| row.trade_date);
    Ok(rows)
}

// ==================== 종목 목록 ====================

#[derive(Debug, Deserialize)]
struct ListingResponse {
    #[serde(rename = "OutBlock_1")]
    out_block: Option<Vec<ListingRecord>>,
}

#[derive(Debug, Deserialize)]
struct ListingRecord {
    #[serde(rename = "ISU_SRT_CD")]
    ticker: String,
    #[serde(rename = "ISU_ABBRV", default)]
    name: String,
    #[serde(rename = "ISU_ENG_NM", default)]
    name_en: Option<String>,
    #[serde(rename = "MKT_NM", default)]
    market_name: Option<String>,
    #[serde(rename = "SECT_TP_NM", default)]
    sector: Option<String>,
}

/// 시장별 종목 목록 데이터 소스. entity는 시장 구분 (`STK`, `KSQ`).
pub struct KrxListingFetcher {
    client: Arc<KrxClient>,
}

impl KrxListingFetcher {
    pub fn new(client: Arc<KrxClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetch for KrxListingFetcher {
    #[instrument(skip(self, _window))]
    async fn fetch(&self, entity: &str, _window: &SyncWindow) -> Result<Option<Table>> {
        let params = [
            ("bld", BLD_MARKET_LISTING),
            ("mktId", entity),
            ("share", "1"),
            ("csvxls_isNo", "false"),
        ];

        let response: ListingResponse = self.client.post_json(&params).await?;
        let rows = listing_rows(entity, response.out_block.unwrap_or_default());

        info!(market = entity, count = rows.len(), "KRX 종목 목록 조회 완료");
        Ok(if rows.is_empty() { None } else { Some(rows) })
    }

    fn reset(&self) {
        self.client.reset();
    }
}

fn listing_rows(market: &str, records: Vec<ListingRecord>) -> Table {
    records
        .into_iter()
        .filter(|r| !r.ticker.trim().is_empty())
        .map(|r| {
            let mut row = Row::item(r.ticker.trim())
                .with_field("name", r.name)
                .with_field("market", market);
            if let Some(name_en) = r.name_en {
                row = row.with_field("name_en", name_en);
            }
            if let Some(market_name) = r.market_name {
                row = row.with_field("market_name", market_name);
            }
            if let Some(sector) = r.sector {
                row = row.with_field("sector", sector);
            }
            row
        })
        .collect()
}

// ==================== 파싱 ====================

/// KRX 날짜 문자열 파싱 (YYYY/MM/DD 또는 YYYYMMDD).
fn parse_krx_date(s: &str) -> Result<NaiveDate> {
    let format = if s.contains('/') { "%Y/%m/%d" } else { "%Y%m%d" };
    NaiveDate::parse_from_str(s.trim(), format)
        .map_err(|e| SyncError::InvalidData(format!("날짜 파싱 실패: {} - {}", s, e)))
}

/// KRX 숫자 문자열 파싱 (쉼표 제거).
fn parse_krx_number(s: &str) -> Result<Decimal> {
    let s = s.trim();
    if s.is_empty() || s == "-" {
        return Ok(Decimal::ZERO);
    }

    Decimal::from_str(&s.replace(',', ""))
        .map_err(|e| SyncError::InvalidData(format!("숫자 파싱 실패: {} - {}", s, e)))
}
