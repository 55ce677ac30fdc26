//! 저장소 인터페이스.
//!
//! 엔진은 저장소의 쿼리/갱신 방식을 알지 못하며, 아래 세 연산만 사용합니다:
//! - 종목의 마지막 동기화 마커 조회
//! - 증분 행 저장
//! - 목록(카탈로그) 키 집합 조회

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::Result;
use crate::model::{Key, KeyField, Row, Table};

/// 동기화 대상 저장소.
#[async_trait]
pub trait Store: Send + Sync {
    /// 종목의 마커 (해당 키 필드 값이 가장 큰 행).
    async fn load_marker(&self, dataset: &str, entity: &str, key: KeyField) -> Result<Option<Row>>;

    /// 행 저장. 실제로 기록된 행 수를 반환합니다.
    async fn save(&self, dataset: &str, entity: &str, rows: Table) -> Result<usize>;

    /// 데이터셋 전체의 키 집합.
    async fn load_key_set(&self, dataset: &str, key: KeyField) -> Result<HashSet<Key>>;
}

/// 행 식별자: (종목코드, 거래일자).
type RowId = (String, Option<chrono::NaiveDate>);

/// 메모리 저장소.
///
/// 테스트와 dry-run에 사용합니다. 같은 (종목, 거래일자) 행은 덮어쓰지 않습니다.
#[derive(Debug, Default)]
pub struct MemoryStore {
    datasets: RwLock<HashMap<String, BTreeMap<RowId, Row>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 초기 데이터 적재.
    pub async fn seed(&self, dataset: &str, rows: impl IntoIterator<Item = Row>) {
        let mut datasets = self.datasets.write().await;
        let table = datasets.entry(dataset.to_string()).or_default();
        for row in rows {
            table.insert((row.code.clone(), row.trade_date), row);
        }
    }

    /// 데이터셋의 모든 행 (종목코드, 거래일자 순).
    pub async fn rows(&self, dataset: &str) -> Vec<Row> {
        self.datasets
            .read()
            .await
            .get(dataset)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default()
    }

    /// 특정 종목의 행.
    pub async fn entity_rows(&self, dataset: &str, entity: &str) -> Vec<Row> {
        self.rows(dataset)
            .await
            .into_iter()
            .filter(|row| row.code == entity)
            .collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn load_marker(&self, dataset: &str, entity: &str, key: KeyField) -> Result<Option<Row>> {
        let datasets = self.datasets.read().await;
        let marker = datasets.get(dataset).and_then(|table| {
            table
                .values()
                .filter(|row| row.code == entity)
                .filter_map(|row| row.key(key).map(|k| (k, row)))
                .max_by(|(a, _), (b, _)| a.cmp(b))
                .map(|(_, row)| row.clone())
        });
        Ok(marker)
    }

    async fn save(&self, dataset: &str, entity: &str, rows: Table) -> Result<usize> {
        let mut datasets = self.datasets.write().await;
        let table = datasets.entry(dataset.to_string()).or_default();

        let mut inserted = 0;
        for row in rows {
            let id = (row.code.clone(), row.trade_date);
            if !table.contains_key(&id) {
                table.insert(id, row);
                inserted += 1;
            }
        }

        debug!(dataset = dataset, entity = entity, inserted = inserted, "메모리 저장");
        Ok(inserted)
    }

    async fn load_key_set(&self, dataset: &str, key: KeyField) -> Result<HashSet<Key>> {
        let datasets = self.datasets.read().await;
        Ok(datasets
            .get(dataset)
            .map(|table| table.values().filter_map(|row| row.key(key)).collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_marker_is_latest_row() {
        let store = MemoryStore::new();
        store
            .seed(
                "stock_daily",
                vec![
                    Row::bar("005930", date(2024, 1, 8)),
                    Row::bar("005930", date(2024, 1, 9)),
                    Row::bar("000660", date(2024, 1, 10)),
                ],
            )
            .await;

        let marker = store
            .load_marker("stock_daily", "005930", KeyField::TradeDate)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(marker.trade_date, Some(date(2024, 1, 9)));

        let none = store
            .load_marker("stock_daily", "035720", KeyField::TradeDate)
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_save_skips_existing_rows() {
        let store = MemoryStore::new();
        let first = store
            .save(
                "stock_daily",
                "005930",
                vec![Row::bar("005930", date(2024, 1, 9))],
            )
            .await
            .unwrap();
        let second = store
            .save(
                "stock_daily",
                "005930",
                vec![
                    Row::bar("005930", date(2024, 1, 9)),
                    Row::bar("005930", date(2024, 1, 10)),
                ],
            )
            .await
            .unwrap();

        assert_eq!((first, second), (1, 1));
        assert_eq!(store.entity_rows("stock_daily", "005930").await.len(), 2);
    }

    #[tokio::test]
    async fn test_key_set() {
        let store = MemoryStore::new();
        store
            .seed("stock_list", vec![Row::item("AAA"), Row::item("BBB")])
            .await;

        let keys = store.load_key_set("stock_list", KeyField::Code).await.unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&Key::Code("AAA".to_string())));
        assert!(store
            .load_key_set("missing", KeyField::Code)
            .await
            .unwrap()
            .is_empty());
    }
}
