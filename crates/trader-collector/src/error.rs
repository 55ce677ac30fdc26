//! 에러 타입 정의.

use std::fmt;
use trader_sync::SyncError;

/// Collector 에러 타입
#[derive(Debug)]
pub enum CollectorError {
    /// 데이터베이스 에러
    Database(sqlx::Error),
    /// 설정 에러
    Config(String),
    /// 데이터 소스 에러 (KRX)
    DataSource(String),
    /// 동기화 엔진 에러
    Sync(SyncError),
}

impl fmt::Display for CollectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database(e) => write!(f, "Database error: {}", e),
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
            Self::DataSource(msg) => write!(f, "Data source error: {}", msg),
            Self::Sync(e) => write!(f, "Sync error: {}", e),
        }
    }
}

impl std::error::Error for CollectorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Database(e) => Some(e),
            Self::Sync(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for CollectorError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err)
    }
}

impl From<SyncError> for CollectorError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Config(msg) => Self::Config(msg),
            other => Self::Sync(other),
        }
    }
}

impl From<reqwest::Error> for CollectorError {
    fn from(err: reqwest::Error) -> Self {
        Self::DataSource(err.to_string())
    }
}

/// 엔진 경계에서 사용: 수집기 에러를 동기화 에러로 변환.
impl From<CollectorError> for SyncError {
    fn from(err: CollectorError) -> Self {
        match err {
            CollectorError::Database(e) => SyncError::Store(e.to_string()),
            CollectorError::Config(msg) => SyncError::Config(msg),
            CollectorError::DataSource(msg) => SyncError::Fetch(msg),
            CollectorError::Sync(e) => e,
        }
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, CollectorError>;
