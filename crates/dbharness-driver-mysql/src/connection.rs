//! MySQL connection implementation

use async_trait::async_trait;
use mysql_async::{
    consts::ColumnType, prelude::*, Conn, Opts, OptsBuilder, Params, Pool, PoolConstraints,
    PoolOpts, Row as MySqlRow,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use dbharness_core::{
    ColumnMeta, Connection, HarnessError, ParamStyle, QueryResult, Result, Row, ServerInfo,
    StatementResult, Transaction, Value,
};

/// MySQL connection wrapper
///
/// Also used for the MySQL-compatible engines (MariaDB, TiDB, OceanBase).
/// Internally backed by a single-connection mysql_async pool; the outer
/// harness pool does the real pooling.
pub struct MySqlConnection {
    pool: Pool,
    /// Stored at connect time so callers can resolve the active database
    /// without relying on `DATABASE()` which returns NULL when no database
    /// was selected.
    database_name: Option<String>,
    closed: AtomicBool,
}

impl MySqlConnection {
    /// Connect to a MySQL-compatible database
    pub async fn connect(
        host: &str,
        port: u16,
        database: Option<&str>,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<Self> {
        tracing::info!(host = %host, port = %port, database = ?database, "connecting to MySQL database");

        let mut opts_builder = OptsBuilder::from_opts(Opts::default())
            .ip_or_hostname(host)
            .tcp_port(port);

        if let Some(db) = database {
            opts_builder = opts_builder.db_name(Some(db));
        }
        if let Some(u) = user {
            opts_builder = opts_builder.user(Some(u));
        }
        if let Some(p) = password {
            opts_builder = opts_builder.pass(Some(p));
        }

        let constraints = PoolConstraints::new(1, 1).ok_or_else(|| {
            HarnessError::Connection(
                "Failed to configure MySQL pool constraints (min=1, max=1)".into(),
            )
        })?;

        let pool_opts = PoolOpts::default()
            .with_constraints(constraints)
            .with_reset_connection(false);
        opts_builder = opts_builder.pool_opts(pool_opts);

        let pool = Pool::new(Opts::from(opts_builder));

        // Verify connectivity by acquiring and releasing a connection
        let _conn = pool
            .get_conn()
            .await
            .map_err(|e| HarnessError::Connection(format!("Failed to connect to MySQL: {}", e)))?;

        // Resolve the active database name once so it is available later
        // without another round trip.
        let database_name = match database {
            Some(db) => Some(db.to_string()),
            None => {
                let mut conn = pool.get_conn().await.map_err(|e| {
                    HarnessError::Connection(format!(
                        "Failed to get connection for DATABASE() query: {}",
                        e
                    ))
                })?;
                let row: Option<(Option<String>,)> = conn
                    .query_first("SELECT DATABASE()")
                    .await
                    .map_err(|e| HarnessError::Query(format!("Failed to query DATABASE(): {}", e)))?;
                row.and_then(|(db,)| db)
            }
        };

        tracing::debug!(host = %host, port = %port, database = ?database_name, "MySQL connection established");
        Ok(Self {
            pool,
            database_name,
            closed: AtomicBool::new(false),
        })
    }

    async fn get_conn(&self) -> Result<Conn> {
        self.pool
            .get_conn()
            .await
            .map_err(|e| HarnessError::Connection(format!("Failed to get MySQL connection: {}", e)))
    }

    /// The database selected at connect time, if any.
    ///
    /// In MySQL, "schema" and "database" are synonymous.
    pub fn default_database(&self) -> Option<&str> {
        self.database_name.as_deref()
    }
}

/// Convert a Value into a mysql_async parameter value
fn to_mysql_value(value: &Value) -> mysql_async::Value {
    match value {
        Value::Null => mysql_async::Value::NULL,
        Value::Bool(v) => mysql_async::Value::Int(*v as i64),
        Value::Int16(v) => mysql_async::Value::Int(*v as i64),
        Value::Int32(v) => mysql_async::Value::Int(*v as i64),
        Value::Int64(v) => mysql_async::Value::Int(*v),
        Value::Float32(v) => mysql_async::Value::Float(*v),
        Value::Float64(v) => mysql_async::Value::Double(*v),
        Value::Decimal(v) => mysql_async::Value::Bytes(v.clone().into_bytes()),
        Value::String(v) => mysql_async::Value::Bytes(v.clone().into_bytes()),
        Value::Bytes(v) => mysql_async::Value::Bytes(v.clone()),
        Value::Uuid(v) => mysql_async::Value::Bytes(v.to_string().into_bytes()),
        Value::Json(v) => mysql_async::Value::Bytes(v.to_string().into_bytes()),
        Value::Date(d) => {
            use chrono::Datelike;
            mysql_async::Value::Date(d.year() as u16, d.month() as u8, d.day() as u8, 0, 0, 0, 0)
        }
        Value::Time(t) => {
            use chrono::Timelike;
            mysql_async::Value::Time(
                false,
                0,
                t.hour() as u8,
                t.minute() as u8,
                t.second() as u8,
                t.nanosecond() / 1000,
            )
        }
        Value::DateTime(dt) => {
            use chrono::{Datelike, Timelike};
            mysql_async::Value::Date(
                dt.year() as u16,
                dt.month() as u8,
                dt.day() as u8,
                dt.hour() as u8,
                dt.minute() as u8,
                dt.second() as u8,
                dt.nanosecond() / 1000,
            )
        }
        Value::DateTimeUtc(dt) => to_mysql_value(&Value::DateTime(dt.naive_utc())),
    }
}

fn to_params(params: &[Value]) -> Params {
    if params.is_empty() {
        Params::Empty
    } else {
        Params::Positional(params.iter().map(to_mysql_value).collect())
    }
}

/// Convert mysql_async Value to our Value type, using column type metadata
/// to correctly interpret byte strings from the text protocol.
fn mysql_value_to_value(val: mysql_async::Value, col_type: ColumnType) -> Value {
    match val {
        mysql_async::Value::NULL => Value::Null,
        mysql_async::Value::Bytes(bytes) => {
            if let Ok(s) = String::from_utf8(bytes.clone()) {
                match col_type {
                    ColumnType::MYSQL_TYPE_TINY
                    | ColumnType::MYSQL_TYPE_SHORT
                    | ColumnType::MYSQL_TYPE_LONG
                    | ColumnType::MYSQL_TYPE_LONGLONG
                    | ColumnType::MYSQL_TYPE_INT24
                    | ColumnType::MYSQL_TYPE_YEAR => {
                        s.parse::<i64>().map(Value::Int64).unwrap_or(Value::String(s))
                    }
                    ColumnType::MYSQL_TYPE_FLOAT => {
                        s.parse::<f32>().map(Value::Float32).unwrap_or(Value::String(s))
                    }
                    ColumnType::MYSQL_TYPE_DOUBLE => {
                        s.parse::<f64>().map(Value::Float64).unwrap_or(Value::String(s))
                    }
                    ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => {
                        Value::Decimal(s)
                    }
                    _ => Value::String(s),
                }
            } else {
                Value::Bytes(bytes)
            }
        }
        mysql_async::Value::Int(i) => Value::Int64(i),
        mysql_async::Value::UInt(u) => {
            if u <= i64::MAX as u64 {
                Value::Int64(u as i64)
            } else {
                Value::String(u.to_string())
            }
        }
        mysql_async::Value::Float(f) => Value::Float32(f),
        mysql_async::Value::Double(d) => Value::Float64(d),
        mysql_async::Value::Date(year, month, day, hour, min, sec, micro) => {
            if hour == 0 && min == 0 && sec == 0 && micro == 0 {
                if let Some(date) =
                    chrono::NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
                {
                    Value::Date(date)
                } else {
                    Value::String(format!("{:04}-{:02}-{:02}", year, month, day))
                }
            } else if let Some(dt) =
                chrono::NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
                    .and_then(|d| d.and_hms_micro_opt(hour as u32, min as u32, sec as u32, micro))
            {
                Value::DateTime(dt)
            } else {
                Value::String(format!(
                    "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                    year, month, day, hour, min, sec
                ))
            }
        }
        mysql_async::Value::Time(negative, days, hours, mins, secs, micros) => {
            let total_hours = (days as u32) * 24 + (hours as u32);
            let sign = if negative { "-" } else { "" };
            Value::String(format!(
                "{}{:02}:{:02}:{:02}.{:06}",
                sign, total_hours, mins, secs, micros
            ))
        }
    }
}

/// Build a QueryResult from fetched rows
fn rows_to_result(mysql_rows: Vec<MySqlRow>, execution_time_ms: u64) -> QueryResult {
    let mut columns = Vec::new();
    let mut column_names = Vec::new();
    let mut column_types = Vec::new();

    if let Some(first_row) = mysql_rows.first() {
        for (idx, col) in first_row.columns_ref().iter().enumerate() {
            let name = col.name_str().to_string();
            column_names.push(name.clone());
            column_types.push(col.column_type());
            columns.push(ColumnMeta {
                name,
                data_type: format!("{:?}", col.column_type()),
                nullable: true,
                ordinal: idx,
            });
        }
    }

    let mut rows = Vec::new();
    for mysql_row in mysql_rows {
        let mut values = Vec::new();
        for idx in 0..columns.len() {
            let mysql_val: mysql_async::Value =
                mysql_row.get(idx).unwrap_or(mysql_async::Value::NULL);
            let col_type = column_types
                .get(idx)
                .copied()
                .unwrap_or(ColumnType::MYSQL_TYPE_STRING);
            values.push(mysql_value_to_value(mysql_val, col_type));
        }
        rows.push(Row::new(column_names.clone(), values));
    }

    QueryResult {
        columns,
        rows,
        affected_rows: 0,
        execution_time_ms,
    }
}

async fn query_on_conn(conn: &mut Conn, sql: &str, params: &[Value]) -> Result<QueryResult> {
    let start_time = std::time::Instant::now();

    let mysql_rows: Vec<MySqlRow> = if params.is_empty() {
        conn.query(sql)
            .await
            .map_err(|e| HarnessError::Query(format!("Failed to execute query: {}", e)))?
    } else {
        conn.exec(sql, to_params(params))
            .await
            .map_err(|e| HarnessError::Query(format!("Failed to execute query: {}", e)))?
    };

    let execution_time_ms = start_time.elapsed().as_millis() as u64;
    let result = rows_to_result(mysql_rows, execution_time_ms);

    tracing::debug!(
        row_count = result.row_count(),
        execution_time_ms = execution_time_ms,
        "query executed"
    );
    Ok(result)
}

async fn execute_on_conn(conn: &mut Conn, sql: &str, params: &[Value]) -> Result<StatementResult> {
    let start_time = std::time::Instant::now();

    if params.is_empty() {
        conn.query_drop(sql)
            .await
            .map_err(|e| HarnessError::Query(format!("Failed to execute statement: {}", e)))?;
    } else {
        conn.exec_drop(sql, to_params(params))
            .await
            .map_err(|e| HarnessError::Query(format!("Failed to execute statement: {}", e)))?;
    }

    let affected_rows = conn.affected_rows();
    tracing::debug!(affected_rows = affected_rows, "statement executed");
    Ok(StatementResult {
        affected_rows,
        execution_time_ms: start_time.elapsed().as_millis() as u64,
    })
}

#[async_trait]
impl Connection for MySqlConnection {
    fn driver_name(&self) -> &str {
        "mysql"
    }

    fn param_style(&self) -> ParamStyle {
        ParamStyle::Question
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        let mut conn = self.get_conn().await?;
        execute_on_conn(&mut conn, sql, params).await
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let mut conn = self.get_conn().await?;
        query_on_conn(&mut conn, sql, params).await
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        tracing::debug!("beginning MySQL transaction");

        // Hold a dedicated connection for the duration of the transaction
        let mut conn = self.get_conn().await?;
        conn.query_drop("START TRANSACTION")
            .await
            .map_err(|e| HarnessError::Query(format!("Failed to begin transaction: {}", e)))?;

        Ok(Box::new(MySqlTransaction {
            conn: Arc::new(Mutex::new(Some(conn))),
            committed: false,
            rolled_back: false,
        }))
    }

    async fn server_info(&self) -> Result<ServerInfo> {
        let mut conn = self.get_conn().await?;
        let version: Option<String> = conn
            .query_first("SELECT VERSION()")
            .await
            .map_err(|e| HarnessError::Query(format!("Failed to query VERSION(): {}", e)))?;
        let product_version = version.unwrap_or_default();

        // Compatible engines tag themselves in the version string, e.g.
        // "11.4.2-MariaDB" or "8.0.11-TiDB-v8.2.0".
        let product_name = if product_version.contains("MariaDB") {
            "MariaDB"
        } else if product_version.contains("TiDB") {
            "TiDB"
        } else if product_version.contains("OceanBase") {
            "OceanBase"
        } else {
            "MySQL"
        };

        Ok(ServerInfo {
            product_name: product_name.to_string(),
            product_version,
            driver_name: "mysql_async".to_string(),
            driver_version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    async fn close(&self) -> Result<()> {
        tracing::debug!("closing MySQL connection pool");
        self.closed.store(true, Ordering::SeqCst);
        self.pool
            .clone()
            .disconnect()
            .await
            .map_err(|e| HarnessError::Connection(format!("Failed to close MySQL connection: {}", e)))
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// MySQL transaction implementation
///
/// Holds a dedicated connection for the duration of the transaction; the
/// connection returns to the inner pool once committed or rolled back.
pub struct MySqlTransaction {
    conn: Arc<Mutex<Option<Conn>>>,
    committed: bool,
    rolled_back: bool,
}

#[async_trait]
impl Transaction for MySqlTransaction {
    async fn commit(mut self: Box<Self>) -> Result<()> {
        if self.committed {
            return Err(HarnessError::Query("Transaction already committed".into()));
        }
        if self.rolled_back {
            return Err(HarnessError::Query("Transaction already rolled back".into()));
        }

        tracing::debug!("committing MySQL transaction");
        let mut guard = self.conn.lock().await;
        if let Some(mut conn) = guard.take() {
            conn.query_drop("COMMIT")
                .await
                .map_err(|e| HarnessError::Query(format!("Failed to commit transaction: {}", e)))?;
        }
        drop(guard);

        self.committed = true;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        if self.committed {
            return Err(HarnessError::Query("Transaction already committed".into()));
        }
        if self.rolled_back {
            return Err(HarnessError::Query("Transaction already rolled back".into()));
        }

        tracing::debug!("rolling back MySQL transaction");
        let mut guard = self.conn.lock().await;
        if let Some(mut conn) = guard.take() {
            conn.query_drop("ROLLBACK").await.map_err(|e| {
                HarnessError::Query(format!("Failed to rollback transaction: {}", e))
            })?;
        }
        drop(guard);

        self.rolled_back = true;
        Ok(())
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        let mut guard = self.conn.lock().await;
        match guard.as_mut() {
            Some(conn) => execute_on_conn(conn, sql, params).await,
            None => Err(HarnessError::Query(
                "Transaction connection no longer available".into(),
            )),
        }
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let mut guard = self.conn.lock().await;
        match guard.as_mut() {
            Some(conn) => query_on_conn(conn, sql, params).await,
            None => Err(HarnessError::Query(
                "Transaction connection no longer available".into(),
            )),
        }
    }
}

impl Drop for MySqlTransaction {
    fn drop(&mut self) {
        if !self.committed && !self.rolled_back {
            tracing::warn!("MySQL transaction dropped without commit or rollback");
            // The held connection is dropped with the open transaction;
            // the server rolls it back when the session ends.
            if let Ok(mut guard) = self.conn.try_lock() {
                guard.take();
            }
        }
    }
}
