//! 동기화 판단 라이브러리.
//!
//! 모든 함수는 순수 함수이며 I/O를 수행하지 않습니다.
//!
//! - [`is_synced`]: 구간 `[start, end]`가 이미 채워졌는지 (수집 불필요) 판단
//! - [`diff_by_key`]: 새로 조회한 행 중 아직 저장되지 않은 행만 추출
//!
//! # 판단 규칙
//!
//! 1. `start == end`이고 아직 장 마감 기준 시각 이전이면 → 최신
//!    (마감 전에 수집해도 얻을 것이 없음)
//! 2. `start`부터 `end`까지 거래일이 하루도 없으면 → 최신
//! 3. 그 외 → 수집 필요

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;

use crate::calendar::TradeCalendar;

/// "오늘 데이터가 확정되는 시각"을 계산하는 함수.
pub type Cutoff = Arc<dyn Fn(NaiveDateTime) -> NaiveDateTime + Send + Sync>;

/// 기본 장 마감 시각 (15:30).
pub const DEFAULT_MARKET_CLOSE: (u32, u32) = (15, 30);

/// 기본 기준 시각: `now`와 같은 날 15:30.
pub fn default_cutoff(now: NaiveDateTime) -> NaiveDateTime {
    let (hour, minute) = DEFAULT_MARKET_CLOSE;
    let close = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN);
    now.date().and_time(close)
}

/// 지정한 장 마감 시각으로 기준 시각 함수 생성.
pub fn market_close_cutoff(close: NaiveTime) -> Cutoff {
    Arc::new(move |now: NaiveDateTime| now.date().and_time(close))
}

/// 구간 `[start, end]`가 이미 동기화되었는지 판단.
///
/// `start`가 `None`이면 한 번도 동기화되지 않은 종목이므로 항상 `false`입니다
/// (단, 규칙 1은 `start == end`일 때만 적용). 스캔은 `end - start`일로 제한됩니다.
pub fn is_synced(
    calendar: &dyn TradeCalendar,
    start: Option<NaiveDate>,
    end: NaiveDate,
    now: NaiveDateTime,
    cutoff: &dyn Fn(NaiveDateTime) -> NaiveDateTime,
) -> bool {
    if start == Some(end) && now < cutoff(now) {
        return true;
    }

    let Some(start) = start else {
        return false;
    };

    let mut day = start;
    while day <= end {
        if calendar.is_trading_day(day) {
            return false;
        }
        day += Duration::days(1);
    }

    // 구간 내 거래일 없음 (빈 구간 포함)
    true
}

/// 조회한 행에서 이미 저장된 키를 가진 행을 제외.
///
/// 새 행이 하나도 없으면 빈 Vec가 아니라 `None`을 반환합니다.
/// 호출자는 `None`을 "저장 생략"으로 해석합니다. 키가 없는 행은 새 행으로 취급합니다.
pub fn diff_by_key<R, K, F>(stored: &HashSet<K>, fetched: Vec<R>, key: F) -> Option<Vec<R>>
where
    K: Eq + Hash,
    F: Fn(&R) -> Option<K>,
{
    let fresh: Vec<R> = fetched
        .into_iter()
        .filter(|row| match key(row) {
            Some(k) => !stored.contains(&k),
            None => true,
        })
        .collect();

    if fresh.is_empty() {
        None
    } else {
        Some(fresh)
    }
}
