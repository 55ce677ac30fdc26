//! 동기화 엔진 오류 타입.

use thiserror::Error;

/// 동기화 관련 오류.
#[derive(Debug, Error)]
pub enum SyncError {
    /// 외부 데이터 소스 조회 오류 (재시도 대상)
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// 저장소 조회/저장 오류
    #[error("Store error: {0}")]
    Store(String),

    /// 작업 목록 준비 실패 (전체 실행 중단)
    #[error("Prepare error ({function}): {message}")]
    Prepare { function: String, message: String },

    /// 취소 요청으로 중단됨
    #[error("Sync cancelled")]
    Cancelled,

    /// 워커 풀 실행 오류 (blocking 작업 panic 등)
    #[error("Worker error: {0}")]
    Worker(String),

    /// 세션(커넥션) 생성 오류
    #[error("Session error: {0}")]
    Session(String),

    /// 잘못된 데이터 형식
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// 설정 오류
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// 작업 준비 단계 오류 생성.
    pub fn prepare(function: impl Into<String>, message: impl std::fmt::Display) -> Self {
        SyncError::Prepare {
            function: function.into(),
            message: message.to_string(),
        }
    }

    /// 실행 전체를 중단시키는 오류인지 확인합니다.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Prepare { .. } | SyncError::Config(_))
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::InvalidData(err.to_string())
    }
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(err: tokio::task::JoinError) -> Self {
        SyncError::Worker(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
