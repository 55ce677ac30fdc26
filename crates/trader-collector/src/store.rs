//! PostgreSQL 저장소.
//!
//! 모든 데이터셋을 단일 테이블 `sync_rows`에 보관합니다.
//! 행 식별자는 `(dataset, code, row_key)`이며, 시계열 행의 `row_key`는 거래일자(YYYY-MM-DD),
//! 목록 행은 빈 문자열입니다. 이미 있는 행은 덮어쓰지 않습니다 (`ON CONFLICT DO NOTHING`).

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use sqlx::PgPool;
use std::collections::HashSet;
use tracing::{debug, info, instrument};
use trader_sync::{Key, KeyField, Row, Store, SyncError, Table};

/// UNNEST 배치 크기
const INSERT_CHUNK: usize = 500;

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS sync_rows (
    dataset     TEXT        NOT NULL,
    code        TEXT        NOT NULL,
    row_key     TEXT        NOT NULL,
    trade_date  DATE,
    fields      JSONB       NOT NULL DEFAULT '{}'::jsonb,
    fetched_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (dataset, code, row_key)
)
"#;

const CREATE_MARKER_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_sync_rows_marker
    ON sync_rows (dataset, code, trade_date DESC)
"#;

type RowRecord = (String, Option<NaiveDate>, Value);

/// sqlx 기반 저장소.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 테이블/인덱스 생성 (없을 때만).
    pub async fn ensure_schema(&self) -> crate::Result<()> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_MARKER_INDEX).execute(&self.pool).await?;
        debug!("sync_rows 스키마 확인 완료");
        Ok(())
    }

    /// 인덱스 재구성과 통계 갱신. 실행이 끝난 뒤(두 게이트가 비워진 뒤) 호출합니다.
    pub async fn rebuild_indexes(&self) -> crate::Result<()> {
        sqlx::query("REINDEX TABLE sync_rows")
            .execute(&self.pool)
            .await?;
        sqlx::query("ANALYZE sync_rows").execute(&self.pool).await?;
        info!("sync_rows 인덱스 재구성 완료");
        Ok(())
    }
}

fn store_error(err: sqlx::Error) -> SyncError {
    SyncError::Store(err.to_string())
}

/// 행 식별 키 (시계열: 거래일자, 목록: 빈 문자열).
fn row_key(row: &Row) -> String {
    row.trade_date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

fn to_row((code, trade_date, fields): RowRecord) -> Row {
    Row {
        code,
        trade_date,
        fields: match fields {
            Value::Object(map) => map,
            _ => Default::default(),
        },
    }
}

#[async_trait]
impl Store for PgStore {
    #[instrument(skip(self))]
    async fn load_marker(
        &self,
        dataset: &str,
        entity: &str,
        key: KeyField,
    ) -> trader_sync::Result<Option<Row>> {
        let sql = match key {
            KeyField::TradeDate => {
                r#"
                SELECT code, trade_date, fields FROM sync_rows
                WHERE dataset = $1 AND code = $2 AND trade_date IS NOT NULL
                ORDER BY trade_date DESC
                LIMIT 1
                "#
            }
            KeyField::Code => {
                r#"
                SELECT code, trade_date, fields FROM sync_rows
                WHERE dataset = $1 AND code = $2
                ORDER BY code DESC
                LIMIT 1
                "#
            }
        };

        let record: Option<RowRecord> = sqlx::query_as(sql)
            .bind(dataset)
            .bind(entity)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        Ok(record.map(to_row))
    }

    #[instrument(skip(self, rows), fields(count = rows.len()))]
    async fn save(&self, dataset: &str, entity: &str, rows: Table) -> trader_sync::Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut inserted = 0;
        // 조각 하나라도 실패하면 전체 롤백
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        // UNNEST 패턴으로 일괄 삽입
        for chunk in rows.chunks(INSERT_CHUNK) {
            let datasets: Vec<&str> = chunk.iter().map(|_| dataset).collect();
            let codes: Vec<&str> = chunk.iter().map(|r| r.code.as_str()).collect();
            let keys: Vec<String> = chunk.iter().map(row_key).collect();
            let dates: Vec<Option<NaiveDate>> = chunk.iter().map(|r| r.trade_date).collect();
            let fields: Vec<Value> = chunk
                .iter()
                .map(|r| Value::Object(r.fields.clone()))
                .collect();

            let result = sqlx::query(
                r#"
                INSERT INTO sync_rows (dataset, code, row_key, trade_date, fields, fetched_at)
                SELECT d, c, k, t, f, NOW()
                FROM UNNEST($1::text[], $2::text[], $3::text[], $4::date[], $5::jsonb[])
                    AS u(d, c, k, t, f)
                ON CONFLICT (dataset, code, row_key) DO NOTHING
                "#,
            )
            .bind(&datasets)
            .bind(&codes)
            .bind(&keys)
            .bind(&dates)
            .bind(&fields)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

            inserted += result.rows_affected() as usize;
        }

        tx.commit().await.map_err(store_error)?;

        debug!(
            dataset = dataset,
            entity = entity,
            inserted = inserted,
            "sync_rows 저장"
        );

        Ok(inserted)
    }

    #[instrument(skip(self))]
    async fn load_key_set(&self, dataset: &str, key: KeyField) -> trader_sync::Result<HashSet<Key>> {
        match key {
            KeyField::TradeDate => {
                let dates: Vec<(NaiveDate,)> = sqlx::query_as(
                    r#"
                    SELECT DISTINCT trade_date FROM sync_rows
                    WHERE dataset = $1 AND trade_date IS NOT NULL
                    "#,
                )
                .bind(dataset)
                .fetch_all(&self.pool)
                .await
                .map_err(store_error)?;

                Ok(dates.into_iter().map(|(d,)| Key::Date(d)).collect())
            }
            KeyField::Code => {
                let codes: Vec<(String,)> = sqlx::query_as(
                    r#"
                    SELECT DISTINCT code FROM sync_rows
                    WHERE dataset = $1 AND code <> ''
                    "#,
                )
                .bind(dataset)
                .fetch_all(&self.pool)
                .await
                .map_err(store_error)?;

                Ok(codes.into_iter().map(|(c,)| Key::Code(c)).collect())
            }
        }
    }
}
