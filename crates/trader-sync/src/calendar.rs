//! 거래일 캘린더.

use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::BTreeSet;

use crate::error::{Result, SyncError};

/// "이 날짜가 거래일인가?"에 답하는 캘린더.
pub trait TradeCalendar: Send + Sync {
    fn is_trading_day(&self, date: NaiveDate) -> bool;
}

/// 주말과 지정 휴장일을 제외한 평일 캘린더.
#[derive(Debug, Clone, Default)]
pub struct WeekdayCalendar {
    holidays: BTreeSet<NaiveDate>,
}

impl WeekdayCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// 휴장일 목록으로 생성.
    pub fn with_holidays(holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            holidays: holidays.into_iter().collect(),
        }
    }

    /// 쉼표로 구분된 휴장일 문자열 파싱 (YYYY-MM-DD 또는 YYYYMMDD).
    pub fn parse(list: &str) -> Result<Self> {
        let mut holidays = BTreeSet::new();
        for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let date = NaiveDate::parse_from_str(item, "%Y-%m-%d")
                .or_else(|_| NaiveDate::parse_from_str(item, "%Y%m%d"))
                .map_err(|e| SyncError::Config(format!("휴장일 파싱 실패: {} - {}", item, e)))?;
            holidays.insert(date);
        }
        Ok(Self { holidays })
    }

    /// 휴장일 추가.
    pub fn add_holiday(&mut self, date: NaiveDate) {
        self.holidays.insert(date);
    }

    pub fn holidays(&self) -> impl Iterator<Item = &NaiveDate> {
        self.holidays.iter()
    }
}

impl TradeCalendar for WeekdayCalendar {
    fn is_trading_day(&self, date: NaiveDate) -> bool {
        if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        !self.holidays.contains(&date)
    }
}
