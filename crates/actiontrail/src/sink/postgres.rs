use super::TraceSink;
use crate::error::{Result, TraceError};
use crate::record::TraceRecord;
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{Pool, Postgres, QueryBuilder};

/// PostgreSQL allows at most this many bind parameters per statement.
const MAX_BIND_PARAMS: usize = 65_535;
const COLUMNS: usize = 9;

/// Postgres-backed trace storage
#[derive(Debug, Clone)]
pub struct PostgresSink {
    pool: Pool<Postgres>,
    table_name: String,
}

impl PostgresSink {
    pub fn new(pool: Pool<Postgres>, table_name: &str) -> Result<Self> {
        if !is_valid_identifier(table_name) {
            return Err(TraceError::Config(format!(
                "Invalid table name: {}",
                table_name
            )));
        }
        Ok(Self {
            pool,
            table_name: table_name.to_string(),
        })
    }

    /// Create the trace table if it does not exist
    pub async fn ensure_schema(&self) -> Result<()> {
        let query = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                trace_id BIGSERIAL PRIMARY KEY,
                user_id BIGINT NOT NULL,
                created_at BIGINT NOT NULL,
                action TEXT NOT NULL,
                method TEXT NOT NULL,
                path_format TEXT NOT NULL,
                endpoint TEXT NOT NULL,
                payload JSONB,
                parameters JSONB,
                status INT
            );
            CREATE INDEX IF NOT EXISTS idx_{}_user_created ON {} (user_id, created_at);
            "#,
            self.table_name, self.table_name, self.table_name
        );

        sqlx::raw_sql(&query).execute(&self.pool).await?;
        Ok(())
    }

    fn insert_statement<'a>(&self, records: &'a [TraceRecord]) -> QueryBuilder<'a, Postgres> {
        let mut builder = QueryBuilder::new(format!(
            "INSERT INTO {} (user_id, created_at, action, method, path_format, endpoint, payload, parameters, status) ",
            self.table_name
        ));
        builder.push_values(records, |mut row, record| {
            row.push_bind(record.user_id)
                .push_bind(record.created_at)
                .push_bind(record.action.as_str())
                .push_bind(record.method.as_str())
                .push_bind(record.path_format.as_str())
                .push_bind(record.endpoint.as_str())
                .push_bind(record.payload.as_ref().map(Json))
                .push_bind(record.parameters.as_ref().map(Json))
                .push_bind(record.status.map(i32::from));
        });
        builder
    }
}

#[async_trait]
impl TraceSink for PostgresSink {
    async fn insert_batch(&self, records: &[TraceRecord]) -> Result<()> {
        let rows_per_statement = MAX_BIND_PARAMS / COLUMNS;

        if records.len() <= rows_per_statement {
            self.insert_statement(records)
                .build()
                .execute(&self.pool)
                .await?;
            return Ok(());
        }

        // Oversized batches still commit or fail as one unit.
        let mut tx = self.pool.begin().await?;
        for chunk in records.chunks(rows_per_statement) {
            self.insert_statement(chunk)
                .build()
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

fn is_valid_identifier(name: &str) -> bool {
    let mut parts = name.split('.');
    let valid_part = |part: &str| {
        let mut chars = part.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    match (parts.next(), parts.next(), parts.next()) {
        (Some(table), None, None) => valid_part(table),
        (Some(schema), Some(table), None) => valid_part(schema) && valid_part(table),
        _ => false,
    }
}
