//! SQLite source: read-only table or query scans, paginated with
//! LIMIT/OFFSET, each page serialized as a JSON array payload.

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use intake_core::{IntakeError, RawPayload};

use crate::{config_err, SourceAdapter};

const DEFAULT_LIMIT: i64 = 100;

/// Parameter map for a SQLite source.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteParams {
    #[serde(default)]
    pub db_path: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default, rename = "where")]
    pub where_clause: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
    #[serde(default)]
    pub mode: Option<String>,
}

impl SqliteParams {
    pub fn parse(params: &Value) -> Result<SqliteParams, IntakeError> {
        let parsed: SqliteParams = serde_json::from_value(params.clone())
            .map_err(|e| config_err(format!("invalid SQLite source params: {e}")))?;
        if parsed.db_path.as_deref().unwrap_or("").is_empty() {
            return Err(config_err("SQLite source requires 'db_path'"));
        }
        parsed.base_query()?;
        Ok(parsed)
    }

    /// The SELECT statement before pagination is appended.
    fn base_query(&self) -> Result<String, IntakeError> {
        match self.mode.as_deref().unwrap_or("table") {
            "table" => {
                let table = self
                    .table
                    .as_deref()
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| config_err("table mode requires 'table'"))?;
                let cols = match &self.columns {
                    Some(columns) if !columns.is_empty() => columns.join(", "),
                    _ => "*".to_string(),
                };
                let mut sql = format!("SELECT {cols} FROM {table}");
                if let Some(clause) = self.where_clause.as_deref().filter(|w| !w.is_empty()) {
                    sql.push_str(&format!(" WHERE {clause}"));
                }
                Ok(sql)
            }
            "query" => {
                let query = self
                    .query
                    .as_deref()
                    .filter(|q| !q.is_empty())
                    .ok_or_else(|| config_err("query mode requires 'query'"))?;
                let lowered = query.trim().to_lowercase();
                if lowered.starts_with("update")
                    || lowered.starts_with("delete")
                    || lowered.starts_with("insert")
                {
                    return Err(config_err("only read-only queries are allowed"));
                }
                Ok(query.to_string())
            }
            other => Err(config_err(format!("unsupported SQLite mode: {other}"))),
        }
    }
}

/// Reads rows from an external SQLite database, one payload per page.
pub struct SqliteSource {
    params: SqliteParams,
}

impl SqliteSource {
    pub fn from_params(params: &Value) -> Result<Self, IntakeError> {
        Ok(Self {
            params: SqliteParams::parse(params)?,
        })
    }

    fn fetch_pages(&self) -> Result<Vec<RawPayload>, IntakeError> {
        let db_path = self.params.db_path.as_deref().unwrap_or_default();
        let base_query = self.params.base_query()?;
        let limit = self.params.limit.unwrap_or(DEFAULT_LIMIT).max(1);
        let mut offset = self.params.offset.unwrap_or(0);

        let conn = Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| IntakeError::Adapter(format!("failed to open {db_path}: {e}")))?;

        let mut payloads = Vec::new();
        loop {
            let (rows, columns) = read_page(&conn, &base_query, limit, offset)?;
            if rows.is_empty() {
                break;
            }
            let row_count = rows.len() as i64;
            debug!(offset, row_count, "fetched SQLite page");
            let body = serde_json::to_vec(&Value::Array(rows))?;
            payloads.push(RawPayload {
                body,
                content_type: Some("application/json".to_string()),
                uri: Some(format!("sqlite://{db_path}")),
                status_code: Some(200),
                row_count: Some(row_count),
                columns: Some(columns),
                ..Default::default()
            });
            if row_count < limit {
                break;
            }
            offset += limit;
        }
        Ok(payloads)
    }
}

#[async_trait]
impl SourceAdapter for SqliteSource {
    async fn fetch(&self) -> Result<Vec<RawPayload>, IntakeError> {
        self.fetch_pages()
    }
}

/// One page of rows as JSON objects, plus the column names.
fn read_page(
    conn: &Connection,
    base_query: &str,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Value>, Vec<String>), IntakeError> {
    let sql = format!("{base_query} LIMIT {limit} OFFSET {offset}");
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| IntakeError::Adapter(format!("SQLite prepare failed: {e}")))?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let mut rows = stmt
        .query([])
        .map_err(|e| IntakeError::Adapter(format!("SQLite query failed: {e}")))?;
    let mut page = Vec::new();
    while let Some(row) = rows
        .next()
        .map_err(|e| IntakeError::Adapter(format!("SQLite row read failed: {e}")))?
    {
        let mut object = serde_json::Map::with_capacity(columns.len());
        for (idx, name) in columns.iter().enumerate() {
            let value = row
                .get_ref(idx)
                .map_err(|e| IntakeError::Adapter(format!("SQLite column read failed: {e}")))?;
            object.insert(name.clone(), json_value(value));
        }
        page.push(Value::Object(object));
    }
    Ok((page, columns))
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("<blob {} bytes>", bytes.len())),
    }
}
