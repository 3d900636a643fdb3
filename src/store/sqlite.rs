use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, Row, Transaction, params, params_from_iter};
use tracing::{debug, info, warn};

use super::{CatalogStore, StoreError};
use crate::models::{ClassSession, ClassType};
use crate::query::{CompiledQuery, OrderBy, Predicate};

const CURRENT_SCHEMA_VERSION: i32 = 1;

const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    code TEXT NOT NULL,
    club TEXT NOT NULL,
    description TEXT NOT NULL,
    duration_minutes INTEGER NOT NULL,
    start_at INTEGER NOT NULL,
    end_at INTEGER NOT NULL,
    local_day TEXT NOT NULL,
    local_hour INTEGER NOT NULL,
    is_virtual INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sessions_start_at ON sessions (start_at);
CREATE TABLE IF NOT EXISTS class_types (
    id TEXT NOT NULL,
    name TEXT NOT NULL
);
";

const SESSION_COLUMNS: &str = "id, name, code, club, description, duration_minutes, \
     start_at, end_at, local_day, local_hour, is_virtual";

/// SQLite-backed catalog. Replaces run as delete+insert inside one
/// transaction, so a failure rolls back to the previous generation.
#[derive(Clone)]
pub struct SqliteCatalog {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCatalog {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
            warn!(error = %err, "failed to enable WAL mode");
        }
        let catalog = Self::init(conn)?;
        info!(path = %path.display(), "SQLite catalog opened");
        Ok(catalog)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(mut conn: Connection) -> Result<Self, StoreError> {
        run_migrations(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn execute<F, T>(&self, task: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Worker("connection mutex poisoned".into()))?;
            task(&mut guard)
        })
        .await
        .map_err(|err| StoreError::Worker(err.to_string()))?
    }
}

fn run_migrations(conn: &mut Connection) -> Result<(), StoreError> {
    let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if version > CURRENT_SCHEMA_VERSION {
        return Err(StoreError::UnsupportedSchema {
            found: version,
            supported: CURRENT_SCHEMA_VERSION,
        });
    }
    if version == CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    tx.execute_batch(SCHEMA_V1)?;
    tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)?;
    tx.commit()?;
    debug!(version = CURRENT_SCHEMA_VERSION, "catalog schema migrated");
    Ok(())
}

fn write_sessions(tx: &Transaction<'_>, sessions: &[ClassSession]) -> Result<(), StoreError> {
    tx.execute("DELETE FROM sessions", [])?;
    let mut stmt = tx.prepare(&format!(
        "INSERT INTO sessions ({SESSION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
    ))?;
    for session in sessions {
        stmt.execute(params![
            session.id,
            session.name,
            session.code,
            session.club,
            session.description,
            session.duration_minutes,
            session.start_at.timestamp_millis(),
            session.end_at.timestamp_millis(),
            session.local_day.format("%Y-%m-%d").to_string(),
            session.local_hour,
            session.is_virtual,
        ])?;
    }
    Ok(())
}

fn write_types(tx: &Transaction<'_>, types: &[ClassType]) -> Result<(), StoreError> {
    tx.execute("DELETE FROM class_types", [])?;
    let mut stmt = tx.prepare("INSERT INTO class_types (id, name) VALUES (?1, ?2)")?;
    for class_type in types {
        stmt.execute(params![class_type.id, class_type.name])?;
    }
    Ok(())
}

/// Renders a predicate as a SQL condition, pushing bound values onto `params`.
fn render_predicate(predicate: &Predicate, params: &mut Vec<Value>) -> String {
    match predicate {
        Predicate::All(parts) if parts.is_empty() => "1 = 1".to_string(),
        Predicate::Any(parts) if parts.is_empty() => "1 = 0".to_string(),
        Predicate::All(parts) => join_parts(parts, " AND ", params),
        Predicate::Any(parts) => join_parts(parts, " OR ", params),
        Predicate::Code(code) => {
            params.push(Value::Text(code.clone()));
            "code = ?".to_string()
        }
        Predicate::Club(club) => {
            params.push(Value::Text(club.clone()));
            "club = ?".to_string()
        }
        Predicate::StartsWithin { from, until } => {
            params.push(Value::Integer(from.timestamp_millis()));
            params.push(Value::Integer(until.timestamp_millis()));
            "(start_at >= ? AND start_at < ?)".to_string()
        }
        Predicate::StartsAfter(instant) => {
            params.push(Value::Integer(instant.timestamp_millis()));
            "start_at > ?".to_string()
        }
        Predicate::LocalHour(hour) => {
            params.push(Value::Integer(i64::from(*hour)));
            "local_hour = ?".to_string()
        }
        Predicate::Virtual(flag) => {
            params.push(Value::Integer(i64::from(*flag)));
            "is_virtual = ?".to_string()
        }
    }
}

fn join_parts(parts: &[Predicate], separator: &str, params: &mut Vec<Value>) -> String {
    let rendered: Vec<String> = parts
        .iter()
        .map(|part| format!("({})", render_predicate(part, params)))
        .collect();
    rendered.join(separator)
}

fn order_clause(order: OrderBy) -> &'static str {
    match order {
        OrderBy::StartAt => "start_at ASC, id ASC",
    }
}

fn conversion_error(index: usize, err: impl std::fmt::Display) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        Type::Text,
        Box::new(StoreError::CorruptRow(err.to_string())),
    )
}

fn millis_to_datetime(index: usize, millis: i64) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| conversion_error(index, format!("timestamp {millis} out of range")))
}

fn row_to_session(row: &Row) -> Result<ClassSession, rusqlite::Error> {
    let local_day: String = row.get(8)?;
    Ok(ClassSession {
        id: row.get(0)?,
        name: row.get(1)?,
        code: row.get(2)?,
        club: row.get(3)?,
        description: row.get(4)?,
        duration_minutes: row.get(5)?,
        start_at: millis_to_datetime(6, row.get(6)?)?,
        end_at: millis_to_datetime(7, row.get(7)?)?,
        local_day: NaiveDate::parse_from_str(&local_day, "%Y-%m-%d")
            .map_err(|err| conversion_error(8, err))?,
        local_hour: row.get(9)?,
        is_virtual: row.get(10)?,
    })
}

#[async_trait]
impl CatalogStore for SqliteCatalog {
    async fn replace_sessions(&self, sessions: Vec<ClassSession>) -> Result<(), StoreError> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            write_sessions(&tx, &sessions)?;
            tx.commit()?;
            debug!(sessions = sessions.len(), "sessions replaced");
            Ok(())
        })
        .await
    }

    async fn replace_types(&self, types: Vec<ClassType>) -> Result<(), StoreError> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            write_types(&tx, &types)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn replace_all(
        &self,
        sessions: Vec<ClassSession>,
        types: Vec<ClassType>,
    ) -> Result<(), StoreError> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            write_sessions(&tx, &sessions)?;
            write_types(&tx, &types)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn query(&self, query: &CompiledQuery) -> Result<Vec<ClassSession>, StoreError> {
        let mut values = Vec::new();
        let condition = render_predicate(&query.predicate, &mut values);
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE {condition} ORDER BY {}",
            order_clause(query.order)
        );
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), row_to_session)?;
            let sessions = rows.collect::<Result<Vec<_>, _>>()?;
            Ok(sessions)
        })
        .await
    }

    async fn all_types(&self) -> Result<Vec<ClassType>, StoreError> {
        self.execute(|conn| {
            let mut stmt = conn.prepare("SELECT id, name FROM class_types ORDER BY rowid")?;
            let rows = stmt.query_map([], |row| {
                Ok(ClassType {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn is_populated(&self) -> Result<bool, StoreError> {
        self.execute(|conn| {
            let populated: bool =
                conn.query_row("SELECT EXISTS (SELECT 1 FROM sessions)", [], |row| row.get(0))?;
            Ok(populated)
        })
        .await
    }
}
