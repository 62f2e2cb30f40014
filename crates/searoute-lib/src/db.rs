//! SQLite-backed gateway and task store.
//!
//! Both read the management service's tables (`ports_port`,
//! `ports_segment`, `tasks_calculationtask`). Columns are read loosely: a NULL
//! or wrongly typed value becomes `None` in the row and is rejected later by
//! record validation instead of failing the query.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::gateway::GraphGateway;
use crate::port::{PortId, PortRow, SegmentRow};
use crate::task::{ResultSink, TaskRecord, TaskReport, TaskRequest};

const DEFAULT_MAX_IDLE: usize = 8;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const PORT_BY_ID_SQL: &str =
    "SELECT id, name, latitude, longitude FROM ports_port WHERE id = ?1";
const ALL_PORTS_SQL: &str = "SELECT id, name, latitude, longitude FROM ports_port ORDER BY id";
const OUTGOING_SEGMENTS_SQL: &str = r#"
    SELECT
        s.id,
        s."PortOfDeparture_id",
        s."PortOfArrival_id",
        s.distance,
        p.id,
        p.name,
        p.latitude,
        p.longitude
    FROM ports_segment s
    JOIN ports_port p ON s."PortOfArrival_id" = p.id
    WHERE s."PortOfDeparture_id" = ?1
    ORDER BY s.id
"#;

/// Small pool of SQLite connections shared between concurrent tasks.
///
/// Connections are opened on demand and returned to an idle list after use;
/// at most `max_idle` are kept.
#[derive(Debug)]
pub struct ConnectionPool {
    path: PathBuf,
    flags: OpenFlags,
    idle: Mutex<Vec<Connection>>,
    max_idle: usize,
}

impl ConnectionPool {
    /// Pool of read-write connections.
    pub fn read_write(path: impl Into<PathBuf>) -> Self {
        Self::with_flags(path, OpenFlags::default())
    }

    /// Pool of read-only connections. Opening fails if the file is missing.
    pub fn read_only(path: impl Into<PathBuf>) -> Self {
        Self::with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
    }

    fn with_flags(path: impl Into<PathBuf>, flags: OpenFlags) -> Self {
        Self {
            path: path.into(),
            flags,
            idle: Mutex::new(Vec::new()),
            max_idle: DEFAULT_MAX_IDLE,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` with a pooled connection.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let connection = self.checkout()?;
        let result = f(&connection);
        self.checkin(connection);
        result
    }

    /// Close every idle connection so the next checkout reopens the file.
    pub fn reset(&self) {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        idle.clear();
    }

    fn checkout(&self) -> Result<Connection> {
        let pooled = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        if let Some(connection) = pooled {
            return Ok(connection);
        }

        let connection = Connection::open_with_flags(&self.path, self.flags)?;
        connection.busy_timeout(BUSY_TIMEOUT)?;
        debug!(path = %self.path.display(), "opened sqlite connection");
        Ok(connection)
    }

    fn checkin(&self, connection: Connection) {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.max_idle {
            idle.push(connection);
        }
    }
}

/// [`GraphGateway`] reading ports and segments from SQLite.
#[derive(Debug)]
pub struct SqliteGateway {
    pool: ConnectionPool,
}

impl SqliteGateway {
    /// Create a gateway for the database at `path`. No connection is opened
    /// until the first query.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            pool: ConnectionPool::read_only(path),
        }
    }

    /// Check that the database is reachable and the port table is queryable.
    ///
    /// Idle connections are dropped first so a schema created after startup
    /// becomes visible.
    pub fn check_ready(&self) -> Result<bool> {
        self.pool.reset();
        self.pool.with_connection(|connection| {
            if !table_exists(connection, "ports_port")? {
                debug!(path = %self.pool.path().display(), "table ports_port not found");
                return Ok(false);
            }
            let ports: i64 =
                connection.query_row("SELECT COUNT(*) FROM ports_port", [], |row| row.get(0))?;
            debug!(ports, "port table reachable");
            Ok(true)
        })
    }
}

impl GraphGateway for SqliteGateway {
    fn port(&self, id: PortId) -> Result<Option<PortRow>> {
        self.pool.with_connection(|connection| {
            let row = connection
                .query_row(PORT_BY_ID_SQL, [id], |row| row_to_port(row, 0))
                .optional()?;
            Ok(row)
        })
    }

    fn all_ports(&self) -> Result<Vec<PortRow>> {
        self.pool.with_connection(|connection| {
            let mut stmt = connection.prepare_cached(ALL_PORTS_SQL)?;
            let rows = stmt.query_map([], |row| row_to_port(row, 0))?;
            let mut ports = Vec::new();
            for row in rows {
                ports.push(row?);
            }
            debug!(ports = ports.len(), "loaded port rows");
            Ok(ports)
        })
    }

    fn outgoing_segments(&self, port_id: PortId) -> Result<Vec<SegmentRow>> {
        self.pool.with_connection(|connection| {
            let mut stmt = connection.prepare_cached(OUTGOING_SEGMENTS_SQL)?;
            let rows = stmt.query_map([port_id], row_to_segment)?;
            let mut segments = Vec::new();
            for row in rows {
                segments.push(row?);
            }
            Ok(segments)
        })
    }
}

/// [`ResultSink`] writing reports into `tasks_calculationtask`.
#[derive(Debug)]
pub struct SqliteTaskStore {
    pool: ConnectionPool,
}

impl SqliteTaskStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            pool: ConnectionPool::read_write(path),
        }
    }

    /// Insert a PENDING task the way the request layer does before queueing it.
    pub fn insert_pending(&self, request: &TaskRequest) -> Result<()> {
        let now = timestamp();
        self.pool.with_connection(|connection| {
            connection.execute(
                "INSERT INTO tasks_calculationtask
                    (task_id, start_port_id, end_port_id, status, created_at, updated_at,
                     vessel_speed_knots)
                 VALUES (?1, ?2, ?3, 'PENDING', ?4, ?4, ?5)",
                params![
                    request.task_id,
                    request.start_port_id,
                    request.end_port_id,
                    now,
                    request.vessel_speed_knots
                ],
            )?;
            Ok(())
        })
    }

    /// Read a task back, or `None` when the id is unknown.
    pub fn fetch(&self, task_id: &str) -> Result<Option<TaskRecord>> {
        let raw = self.pool.with_connection(|connection| {
            let raw = connection
                .query_row(
                    "SELECT task_id, start_port_id, end_port_id, status, result_path,
                            result_distance, result_waypoints_data, vessel_speed_knots,
                            error_message, created_at, updated_at
                     FROM tasks_calculationtask WHERE task_id = ?1",
                    [task_id],
                    |row| {
                        Ok(RawTask {
                            task_id: row.get(0)?,
                            start_port_id: row.get(1)?,
                            end_port_id: row.get(2)?,
                            status: row.get(3)?,
                            result_path: row.get(4)?,
                            result_distance: row.get(5)?,
                            result_waypoints_data: row.get(6)?,
                            vessel_speed_knots: row.get(7)?,
                            error_message: row.get(8)?,
                            created_at: row.get(9)?,
                            updated_at: row.get(10)?,
                        })
                    },
                )
                .optional()?;
            Ok(raw)
        })?;

        raw.map(RawTask::into_record).transpose()
    }
}

impl ResultSink for SqliteTaskStore {
    fn report(&self, report: &TaskReport) -> Result<()> {
        let result_path = report
            .result_path
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let waypoints = report
            .result_waypoints_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let now = timestamp();

        self.pool.with_connection(|connection| {
            let updated = connection.execute(
                "UPDATE tasks_calculationtask
                 SET status = ?2,
                     result_path = ?3,
                     result_distance = ?4,
                     result_waypoints_data = ?5,
                     vessel_speed_knots = COALESCE(?6, vessel_speed_knots),
                     error_message = ?7,
                     updated_at = ?8
                 WHERE task_id = ?1 AND status NOT IN ('COMPLETED', 'FAILED')",
                params![
                    report.task_id,
                    report.status.as_str(),
                    result_path,
                    report.result_distance,
                    waypoints,
                    report.vessel_speed_knots,
                    report.error_message,
                    now
                ],
            )?;
            if updated > 0 {
                return Ok(());
            }

            let current: Option<String> = connection
                .query_row(
                    "SELECT status FROM tasks_calculationtask WHERE task_id = ?1",
                    [report.task_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            Err(match current {
                Some(status) => Error::TaskAlreadyTerminal {
                    task_id: report.task_id.clone(),
                    status,
                },
                None => Error::TaskNotFound {
                    task_id: report.task_id.clone(),
                },
            })
        })?;

        info!(task_id = %report.task_id, status = %report.status, "task updated");
        Ok(())
    }
}

struct RawTask {
    task_id: String,
    start_port_id: PortId,
    end_port_id: PortId,
    status: String,
    result_path: Option<String>,
    result_distance: Option<f64>,
    result_waypoints_data: Option<String>,
    vessel_speed_knots: Option<f64>,
    error_message: Option<String>,
    created_at: Option<String>,
    updated_at: Option<String>,
}

impl RawTask {
    fn into_record(self) -> Result<TaskRecord> {
        let status = self
            .status
            .parse()
            .map_err(|message: String| Error::internal(message))?;
        Ok(TaskRecord {
            task_id: self.task_id,
            start_port_id: self.start_port_id,
            end_port_id: self.end_port_id,
            status,
            result_path: self
                .result_path
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            result_distance: self.result_distance,
            result_waypoints_data: self
                .result_waypoints_data
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            vessel_speed_knots: self.vessel_speed_knots,
            error_message: self.error_message,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn row_to_port(row: &Row<'_>, offset: usize) -> rusqlite::Result<PortRow> {
    Ok(PortRow {
        id: column_i64(row, offset)?,
        name: column_text(row, offset + 1)?,
        latitude: column_f64(row, offset + 2)?,
        longitude: column_f64(row, offset + 3)?,
    })
}

fn row_to_segment(row: &Row<'_>) -> rusqlite::Result<SegmentRow> {
    Ok(SegmentRow {
        id: column_i64(row, 0)?,
        from_port_id: column_i64(row, 1)?,
        to_port_id: column_i64(row, 2)?,
        distance: column_f64(row, 3)?,
        to_port: row_to_port(row, 4)?,
    })
}

fn column_i64(row: &Row<'_>, index: usize) -> rusqlite::Result<Option<i64>> {
    Ok(match row.get_ref(index)? {
        ValueRef::Integer(value) => Some(value),
        _ => None,
    })
}

fn column_f64(row: &Row<'_>, index: usize) -> rusqlite::Result<Option<f64>> {
    Ok(match row.get_ref(index)? {
        ValueRef::Real(value) => Some(value),
        ValueRef::Integer(value) => Some(value as f64),
        _ => None,
    })
}

fn column_text(row: &Row<'_>, index: usize) -> rusqlite::Result<Option<String>> {
    Ok(match row.get_ref(index)? {
        ValueRef::Text(bytes) => std::str::from_utf8(bytes).ok().map(str::to_owned),
        _ => None,
    })
}

fn table_exists(connection: &Connection, table: &str) -> Result<bool> {
    let mut stmt = connection
        .prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 LIMIT 1")?;
    let mut rows = stmt.query([table])?;
    Ok(rows.next()?.is_some())
}
