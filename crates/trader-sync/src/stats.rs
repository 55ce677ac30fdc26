//! 실행 통계.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// 실행 중 갱신되는 카운터 (작업 간 공유).
#[derive(Debug, Default)]
pub struct RunCounters {
    pub up_to_date: AtomicUsize,
    pub fetched: AtomicUsize,
    pub empty: AtomicUsize,
    pub fetch_failed: AtomicUsize,
    pub task_failed: AtomicUsize,
    pub saves_submitted: AtomicUsize,
    pub save_failed: AtomicUsize,
    pub rows_saved: AtomicUsize,
    pub cancelled: AtomicUsize,
}

impl RunCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// 카운터 1 증가.
    pub fn incr(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// 현재 값으로 보고서 생성.
    pub fn snapshot(&self, total: usize, not_scheduled: usize, elapsed: Duration) -> SyncReport {
        let load = |c: &AtomicUsize| c.load(Ordering::Relaxed);
        SyncReport {
            total,
            up_to_date: load(&self.up_to_date),
            fetched: load(&self.fetched),
            empty: load(&self.empty),
            fetch_failed: load(&self.fetch_failed),
            task_failed: load(&self.task_failed),
            saves_submitted: load(&self.saves_submitted),
            save_failed: load(&self.save_failed),
            rows_saved: load(&self.rows_saved),
            cancelled: load(&self.cancelled),
            not_scheduled,
            fetch_peak: 0,
            save_peak: 0,
            elapsed,
        }
    }
}

/// 실행 결과 요약
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    /// 준비된 작업 수
    pub total: usize,
    /// 이미 최신 (수집 생략)
    pub up_to_date: usize,
    /// 새 데이터를 받은 작업 수
    pub fetched: usize,
    /// 조회 성공, 데이터 없음
    pub empty: usize,
    /// 재시도 소진
    pub fetch_failed: usize,
    /// 작업 오류 또는 panic
    pub task_failed: usize,
    /// 제출된 저장 작업 수
    pub saves_submitted: usize,
    /// 저장 실패 수
    pub save_failed: usize,
    /// 저장된 총 행 수
    pub rows_saved: usize,
    /// 실행 중 취소된 작업 수
    pub cancelled: usize,
    /// 취소로 스케줄되지 못한 작업 수
    pub not_scheduled: usize,
    /// fetch 게이트 최대 동시 점유
    pub fetch_peak: usize,
    /// save 게이트 최대 동시 점유
    pub save_peak: usize,
    /// 소요 시간
    #[serde(skip)]
    pub elapsed: Duration,
}

impl SyncReport {
    /// 실패가 하나라도 있었는지.
    pub fn has_failures(&self) -> bool {
        self.fetch_failed > 0 || self.task_failed > 0 || self.save_failed > 0
    }

    /// 스케줄된 모든 작업이 끝까지 실행되었는지.
    pub fn is_complete(&self) -> bool {
        self.not_scheduled == 0 && self.cancelled == 0
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self, operation: &str) {
        tracing::info!(
            operation = operation,
            total = self.total,
            up_to_date = self.up_to_date,
            fetched = self.fetched,
            empty = self.empty,
            fetch_failed = self.fetch_failed,
            task_failed = self.task_failed,
            saves = self.saves_submitted,
            save_failed = self.save_failed,
            rows_saved = self.rows_saved,
            not_scheduled = self.not_scheduled,
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "동기화 완료"
        );
    }
}
