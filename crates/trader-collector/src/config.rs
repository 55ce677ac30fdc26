//! 환경변수 기반 설정 모듈.

use chrono::NaiveTime;
use chrono_tz::Tz;
use std::time::Duration;
use trader_sync::{
    market_clock, market_close_cutoff, Clock, Cutoff, RetryPolicy, SyncOptions, WeekdayCalendar,
    MAX_BACKOFF,
};

use crate::error::CollectorError;
use crate::Result;

/// 최초 수집 과거 일수 상한 (100년)
pub const MAX_HISTORY_DAYS: i64 = 36_500;

/// KRX 정보데이터시스템 기본 URL
pub const DEFAULT_KRX_BASE_URL: &str = "https://data.krx.co.kr";

/// Collector 전체 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// 데이터베이스 URL
    pub database_url: String,
    /// 동기화 엔진 설정
    pub sync: SyncConfig,
    /// KRX 설정
    pub krx: KrxConfig,
    /// 데몬 모드 설정
    pub daemon: DaemonConfig,
}

/// 동기화 엔진 설정
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// 동시 수집 작업 수
    pub fetch_concurrency: usize,
    /// 동시 저장 작업 수
    pub save_concurrency: usize,
    /// 실행할 동기화 함수 (쉼표 구분, 미설정 시 전체)
    pub functions: Option<String>,
    /// 최대 시도 횟수
    pub retry_max_attempts: u32,
    /// 재시도 기준 간격 (밀리초)
    pub retry_backoff_ms: u64,
    /// 장 마감 시각 (이 시각 이후 당일 데이터 수집)
    pub market_close: NaiveTime,
    /// 시장 시간대
    pub timezone: Tz,
    /// 휴장일 (쉼표 구분, YYYY-MM-DD 또는 YYYYMMDD)
    pub holidays: String,
    /// 최초 수집 시 과거 일수
    pub history_days: i64,
}

/// KRX 설정
#[derive(Debug, Clone)]
pub struct KrxConfig {
    /// API 기본 URL (테스트 시 변경)
    pub base_url: String,
    /// HTTP 세션 풀 크기
    pub session_pool_size: usize,
}

/// 데몬 모드 설정
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// 동기화 실행 주기 (분 단위)
    pub interval_minutes: u64,
}

impl CollectorConfig {
    /// 환경변수에서 설정 로드
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 키 조회 함수로 설정 로드.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or_else(|| {
            CollectorError::Config("DATABASE_URL 환경변수가 설정되지 않았습니다".to_string())
        })?;

        let market_close = match lookup("SYNC_MARKET_CLOSE") {
            Some(value) => NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|e| {
                CollectorError::Config(format!("SYNC_MARKET_CLOSE 형식 오류 ({}): {}", value, e))
            })?,
            None => NaiveTime::from_hms_opt(15, 30, 0).unwrap_or(NaiveTime::MIN),
        };

        let timezone = match lookup("SYNC_TIMEZONE") {
            Some(value) => value.trim().parse::<Tz>().map_err(|e| {
                CollectorError::Config(format!("SYNC_TIMEZONE 형식 오류 ({}): {}", value, e))
            })?,
            None => chrono_tz::Asia::Seoul,
        };

        let config = Self {
            database_url,
            sync: SyncConfig {
                fetch_concurrency: parse_or(&lookup, "SYNC_FETCH_CONCURRENCY", 8),
                save_concurrency: parse_or(&lookup, "SYNC_SAVE_CONCURRENCY", 4),
                functions: lookup("SYNC_FUNCTIONS").filter(|s| !s.trim().is_empty()),
                retry_max_attempts: parse_or(&lookup, "SYNC_RETRY_MAX_ATTEMPTS", 3),
                retry_backoff_ms: parse_or(&lookup, "SYNC_RETRY_BACKOFF_MS", 500),
                market_close,
                timezone,
                holidays: lookup("SYNC_HOLIDAYS").unwrap_or_default(),
                history_days: parse_or(&lookup, "SYNC_HISTORY_DAYS", 365),
            },
            krx: KrxConfig {
                base_url: lookup("KRX_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_KRX_BASE_URL.to_string()),
                session_pool_size: parse_or(&lookup, "KRX_SESSION_POOL_SIZE", 4),
            },
            daemon: DaemonConfig {
                interval_minutes: parse_or(&lookup, "DAEMON_INTERVAL_MINUTES", 60),
            },
        };

        config.sync.validate()?;
        Ok(config)
    }
}

impl SyncConfig {
    /// 범위를 벗어난 값 검증.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_HISTORY_DAYS).contains(&self.history_days) {
            return Err(CollectorError::Config(format!(
                "SYNC_HISTORY_DAYS는 1~{} 범위여야 합니다: {}",
                MAX_HISTORY_DAYS, self.history_days
            )));
        }

        if self.retry_backoff_ms > MAX_BACKOFF.as_millis() as u64 {
            return Err(CollectorError::Config(format!(
                "SYNC_RETRY_BACKOFF_MS는 {} 이하여야 합니다: {}",
                MAX_BACKOFF.as_millis(),
                self.retry_backoff_ms
            )));
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max_attempts,
            Duration::from_millis(self.retry_backoff_ms),
        )
    }

    /// 휴장일이 반영된 거래일 캘린더
    pub fn calendar(&self) -> Result<WeekdayCalendar> {
        Ok(WeekdayCalendar::parse(&self.holidays)?)
    }

    pub fn cutoff(&self) -> Cutoff {
        market_close_cutoff(self.market_close)
    }

    pub fn clock(&self) -> Clock {
        market_clock(self.timezone)
    }

    /// DB 커넥션 수. 수집 단계(마커/키 조회)와 저장 단계가 동시에 연결을 사용합니다.
    pub fn db_pool_size(&self) -> u32 {
        let workers = self.fetch_concurrency.max(1) + self.save_concurrency.max(1);
        u32::try_from(workers).unwrap_or(u32::MAX).saturating_add(2)
    }

    pub fn options(&self) -> SyncOptions {
        SyncOptions {
            fetch_concurrency: self.fetch_concurrency,
            save_concurrency: self.save_concurrency,
            functions: self.functions.clone(),
        }
    }
}

impl DaemonConfig {
    /// 실행 주기를 Duration으로 반환
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.max(1) * 60)
    }
}

/// 값을 파싱 (없거나 실패 시 기본값 사용)
fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<CollectorConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CollectorConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[("DATABASE_URL", "postgres://localhost/trader")]).unwrap();

        assert_eq!(config.sync.fetch_concurrency, 8);
        assert_eq!(config.sync.save_concurrency, 4);
        assert_eq!(config.sync.functions, None);
        assert_eq!(config.sync.retry_policy(), RetryPolicy::default());
        assert_eq!(config.sync.market_close, NaiveTime::from_hms_opt(15, 30, 0).unwrap());
        assert_eq!(config.sync.timezone, chrono_tz::Asia::Seoul);
        assert_eq!(config.sync.history_days, 365);
        assert_eq!(config.krx.base_url, DEFAULT_KRX_BASE_URL);
        assert_eq!(config.krx.session_pool_size, 4);
        assert_eq!(config.daemon.interval(), Duration::from_secs(3600));
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("DATABASE_URL", "postgres://localhost/trader"),
            ("SYNC_FETCH_CONCURRENCY", "16"),
            ("SYNC_SAVE_CONCURRENCY", "not-a-number"),
            ("SYNC_FUNCTIONS", "stock_daily"),
            ("SYNC_MARKET_CLOSE", "16:00"),
            ("SYNC_TIMEZONE", "America/New_York"),
            ("SYNC_HOLIDAYS", "2024-02-09,20240212"),
        ])
        .unwrap();

        assert_eq!(config.sync.fetch_concurrency, 16);
        assert_eq!(config.sync.save_concurrency, 4);
        assert_eq!(config.sync.options().functions.as_deref(), Some("stock_daily"));
        assert_eq!(config.sync.timezone, chrono_tz::America::New_York);
        assert_eq!(config.sync.calendar().unwrap().holidays().count(), 2);

        let now = chrono::NaiveDate::from_ymd_opt(2024, 1, 10)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let cutoff = config.sync.cutoff();
        assert_eq!(cutoff(now).time(), NaiveTime::from_hms_opt(16, 0, 0).unwrap());
    }

    #[test]
    fn test_missing_database_url() {
        assert!(matches!(config(&[]), Err(CollectorError::Config(_))));
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        let result = config(&[
            ("DATABASE_URL", "postgres://localhost/trader"),
            ("SYNC_HISTORY_DAYS", "9223372036854775807"),
        ]);
        assert!(matches!(result, Err(CollectorError::Config(_))));

        let result = config(&[
            ("DATABASE_URL", "postgres://localhost/trader"),
            ("SYNC_HISTORY_DAYS", "0"),
        ]);
        assert!(matches!(result, Err(CollectorError::Config(_))));

        let result = config(&[
            ("DATABASE_URL", "postgres://localhost/trader"),
            ("SYNC_RETRY_BACKOFF_MS", "18446744073709551615"),
        ]);
        assert!(matches!(result, Err(CollectorError::Config(_))));
    }

    #[test]
    fn test_db_pool_size_covers_both_stages() {
        let config = config(&[
            ("DATABASE_URL", "postgres://localhost/trader"),
            ("SYNC_FETCH_CONCURRENCY", "16"),
            ("SYNC_SAVE_CONCURRENCY", "1"),
        ])
        .unwrap();
        assert_eq!(config.sync.db_pool_size(), 19);
    }

    #[test]
    fn test_invalid_market_close() {
        let result = config(&[
            ("DATABASE_URL", "postgres://localhost/trader"),
            ("SYNC_MARKET_CLOSE", "3pm"),
        ]);
        assert!(matches!(result, Err(CollectorError::Config(_))));
    }
}
