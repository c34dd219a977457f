use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{probe::Probe, rules::ParameterRule};

#[derive(Debug, Error)]
pub enum CountError {
    #[error("'{0}' is not a valid sql identifier")]
    InvalidIdentifier(String),
    #[error("failed to open catalog database '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    #[error("catalog query failed: {0}")]
    Query(#[from] rusqlite::Error),
    #[error("catalog returned a negative count ({0})")]
    NegativeCount(i64),
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

/// Read-only ground truth for result counts.
pub trait CountSource: Send + Sync {
    /// Number of rows in `table` whose `column` equals `value`.
    fn count_where(&self, table: &str, column: &str, value: &str) -> Result<u64, CountError>;
}

/// SQLite catalog opened read-only; the connection is never written through.
#[derive(Debug)]
pub struct SqliteCatalog {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl SqliteCatalog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CountError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|source| CountError::Open {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CountSource for SqliteCatalog {
    fn count_where(&self, table: &str, column: &str, value: &str) -> Result<u64, CountError> {
        let table = quote_identifier(table)?;
        let column = quote_identifier(column)?;
        let sql = format!("SELECT COUNT(*) FROM {table} WHERE {column} = ?1");

        let conn = self
            .conn
            .lock()
            .map_err(|_| CountError::Unavailable("connection lock poisoned".into()))?;
        let count: i64 = conn.query_row(&sql, [value], |row| row.get(0))?;
        u64::try_from(count).map_err(|_| CountError::NegativeCount(count))
    }
}

/// Table and column names cannot be bound, so only plain identifiers are accepted.
fn quote_identifier(identifier: &str) -> Result<String, CountError> {
    let mut chars = identifier.chars();
    let valid = chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(format!("\"{identifier}\""))
    } else {
        Err(CountError::InvalidIdentifier(identifier.to_string()))
    }
}

/// Result count carried by a listing body: a bare array, or a paginated envelope.
pub fn observed_count(body: &Value) -> Option<u64> {
    match body {
        Value::Array(items) => Some(items.len() as u64),
        Value::Object(map) => map
            .get("count")
            .and_then(Value::as_u64)
            .or_else(|| {
                map.get("results")
                    .and_then(Value::as_array)
                    .map(|items| items.len() as u64)
            }),
        _ => None,
    }
}

/// Comparison of the listing size for `?parameter=value` with the catalog count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountCheck {
    pub parameter: String,
    pub value: String,
    pub column: String,
    pub catalog_count: u64,
    pub observed_count: Option<u64>,
    pub observed_status: Option<u16>,
    pub error: Option<String>,
}

impl CountCheck {
    pub fn matches(&self) -> bool {
        self.error.is_none() && self.observed_count == Some(self.catalog_count)
    }
}

/// Probe `?{rule}={first sample}` and compare the listing size with the rows of `table`.
///
/// Returns `None` for rules without a count column, and when `cancel` fires before the
/// listing answers.
pub async fn cross_check(
    probe: &dyn Probe,
    source: Arc<dyn CountSource>,
    table: &str,
    rule: &ParameterRule,
    path: &str,
    cancel: &CancellationToken,
) -> Option<CountCheck> {
    let column = rule.count_column()?.to_string();
    let value = rule.samples().first()?.clone();
    let mut check = CountCheck {
        parameter: rule.name().to_string(),
        value: value.clone(),
        column: column.clone(),
        catalog_count: 0,
        observed_count: None,
        observed_status: None,
        error: None,
    };

    let lookup_value = value.clone();
    let table = table.to_string();
    let counted = tokio::task::spawn_blocking(move || {
        source.count_where(&table, &column, &lookup_value)
    })
    .await
    .map_err(|err| CountError::Unavailable(err.to_string()))
    .and_then(|result| result);
    match counted {
        Ok(count) => check.catalog_count = count,
        Err(err) => {
            check.error = Some(err.to_string());
            return Some(check);
        }
    }

    let query = [(rule.name().to_string(), value)];
    let observed = tokio::select! {
        biased;
        _ = cancel.cancelled() => return None,
        result = probe.probe(path, &query) => result,
    };
    match observed {
        Ok(response) => {
            check.observed_status = Some(response.status.as_u16());
            check.observed_count = response.body.json().and_then(observed_count);
            if check.observed_count.is_none() {
                check.error = Some("response body carries no result count".into());
            }
        }
        Err(err) => check.error = Some(err.to_string()),
    }
    Some(check)
}
