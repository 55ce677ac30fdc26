//! 동기화 데이터 모델.
//!
//! 저장소와 데이터 소스 사이를 오가는 행(`Row`), 증분 판단에 쓰이는 키(`Key`),
//! 그리고 한 번의 실행이 채우려는 날짜 구간(`SyncWindow`)을 정의합니다.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// 마커로 사용할 키 필드.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyField {
    /// 시계열 동기화 (거래일자 기준)
    TradeDate,
    /// 목록 동기화 (종목코드 집합 기준)
    Code,
}

impl KeyField {
    /// 문자열로 변환
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TradeDate => "trade_date",
            Self::Code => "code",
        }
    }
}

/// 행 식별 키.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Key {
    Date(NaiveDate),
    Code(String),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Key::Code(c) => f.write_str(c),
        }
    }
}

/// 저장 단위 행.
///
/// 시계열 데이터는 `trade_date`를 가지며, 목록(카탈로그) 데이터는 `code`만 가집니다.
/// 나머지 값(시가, 종가, 종목명 등)은 `fields`에 JSON으로 보관합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub code: String,
    pub trade_date: Option<NaiveDate>,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl Row {
    /// 시계열 행 생성.
    pub fn bar(code: impl Into<String>, trade_date: NaiveDate) -> Self {
        Self {
            code: code.into(),
            trade_date: Some(trade_date),
            fields: Map::new(),
        }
    }

    /// 목록 행 생성.
    pub fn item(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            trade_date: None,
            fields: Map::new(),
        }
    }

    /// 필드 추가 (builder).
    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// 지정한 키 필드 값.
    pub fn key(&self, field: KeyField) -> Option<Key> {
        match field {
            KeyField::TradeDate => self.trade_date.map(Key::Date),
            KeyField::Code if self.code.is_empty() => None,
            KeyField::Code => Some(Key::Code(self.code.clone())),
        }
    }
}

/// 데이터 소스 조회 결과 테이블.
pub type Table = Vec<Row>;

/// 동기화 구간 `[start, end]`.
///
/// `start`가 `None`이면 한 번도 동기화되지 않은 종목입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncWindow {
    pub start: Option<NaiveDate>,
    pub end: NaiveDate,
}

impl SyncWindow {
    pub fn new(start: Option<NaiveDate>, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// 마지막 동기화 일자 다음 날부터 오늘(자정 기준)까지의 구간.
    pub fn after_marker(marker: Option<NaiveDate>, now: NaiveDateTime) -> Self {
        Self {
            start: marker.map(|d| d + Duration::days(1)),
            end: now.date(),
        }
    }

    /// 구간이 비어 있는지 (시작일이 종료일 이후).
    pub fn is_empty(&self) -> bool {
        matches!(self.start, Some(start) if start > self.end)
    }

    /// 구간의 일수 (한 번도 동기화되지 않은 경우 None).
    pub fn days(&self) -> Option<i64> {
        self.start
            .map(|start| (self.end - start).num_days() + 1)
            .map(|days| days.max(0))
    }
}

impl fmt::Display for SyncWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.start {
            Some(start) => write!(f, "[{}, {}]", start, self.end),
            None => write!(f, "[-, {}]", self.end),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_window_after_marker() {
        let now = date(2024, 1, 10).and_hms_opt(10, 0, 0).unwrap();

        let window = SyncWindow::after_marker(Some(date(2024, 1, 9)), now);
        assert_eq!(window.start, Some(date(2024, 1, 10)));
        assert_eq!(window.end, date(2024, 1, 10));
        assert_eq!(window.days(), Some(1));
        assert!(!window.is_empty());

        let never = SyncWindow::after_marker(None, now);
        assert_eq!(never.start, None);
        assert_eq!(never.days(), None);
        assert_eq!(never.to_string(), "[-, 2024-01-10]");
    }

    #[test]
    fn test_window_already_current() {
        let now = date(2024, 1, 10).and_hms_opt(18, 0, 0).unwrap();
        let window = SyncWindow::after_marker(Some(date(2024, 1, 10)), now);
        assert!(window.is_empty());
        assert_eq!(window.days(), Some(0));
    }

    #[test]
    fn test_row_key() {
        let bar = Row::bar("005930", date(2024, 1, 10)).with_field("close", 74_000);
        assert_eq!(bar.key(KeyField::TradeDate), Some(Key::Date(date(2024, 1, 10))));
        assert_eq!(bar.key(KeyField::Code), Some(Key::Code("005930".to_string())));
        assert_eq!(bar.fields["close"], 74_000);

        let item = Row::item("AAA");
        assert_eq!(item.key(KeyField::TradeDate), None);
        assert_eq!(Row::item("").key(KeyField::Code), None);
    }
}
