//! Migration execution against a live connection

use std::collections::HashMap;

use dbharness_core::{Connection, HarnessError, ParamStyle, Result, Transaction, Value};

use crate::migration::{split_statements, Migration};

/// Default name of the migration history table
pub const DEFAULT_HISTORY_TABLE: &str = "schema_history";

/// Outcome of a [`Migrator::migrate`] run
#[derive(Debug, Clone, Default)]
pub struct MigrateReport {
    /// Versions applied during this run, in order
    pub applied: Vec<u32>,
    /// Number of migrations that were already recorded in history
    pub already_applied: usize,
}

impl MigrateReport {
    /// Whether this run changed the schema
    pub fn changed(&self) -> bool {
        !self.applied.is_empty()
    }
}

/// Applies a fixed set of migrations to a connection.
///
/// The history table is created on first use. Already-applied migrations
/// are checksum-verified and skipped; pending ones run in version order.
/// The DDL and inserts stick to the SQL subset every supported engine
/// accepts, so one migrator serves both wire families.
#[derive(Debug, Clone)]
pub struct Migrator {
    migrations: Vec<Migration>,
    table: String,
}

impl Migrator {
    /// Create a migrator over the given migrations.
    ///
    /// Returns an error on duplicate versions. The migrations are sorted
    /// by version internally, so input order does not matter.
    pub fn new(mut migrations: Vec<Migration>) -> Result<Self> {
        migrations.sort_by_key(|m| m.version);
        for pair in migrations.windows(2) {
            if pair[0].version == pair[1].version {
                return Err(HarnessError::Migration(format!(
                    "duplicate migration version {}",
                    pair[0].version
                )));
            }
        }
        Ok(Self {
            migrations,
            table: DEFAULT_HISTORY_TABLE.to_string(),
        })
    }

    /// Use a non-default history table name
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// The migrations this migrator manages, sorted by version
    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    /// Run all pending migrations.
    ///
    /// Re-running against an up-to-date schema is a no-op apart from the
    /// checksum verification pass.
    pub async fn migrate(&self, conn: &dyn Connection) -> Result<MigrateReport> {
        self.ensure_history_table(conn).await?;
        let applied = self.load_history(conn).await?;

        let max_applied = applied.keys().max().copied();
        let mut report = MigrateReport::default();
        let mut rank = applied.len() as i64;

        for migration in &self.migrations {
            match applied.get(&migration.version) {
                Some(recorded) => {
                    if recorded != &migration.checksum {
                        return Err(HarnessError::Migration(format!(
                            "checksum mismatch for migration V{} ({}): history has {}, script has {}",
                            migration.version,
                            migration.description,
                            recorded,
                            migration.checksum
                        )));
                    }
                    report.already_applied += 1;
                }
                None => {
                    // A pending version below the applied high-water mark
                    // means the script set changed under recorded history.
                    if let Some(max) = max_applied {
                        if migration.version < max {
                            return Err(HarnessError::Migration(format!(
                                "migration V{} is out of order: history already at V{}",
                                migration.version, max
                            )));
                        }
                    }

                    tracing::info!(
                        version = migration.version,
                        description = %migration.description,
                        "applying migration"
                    );
                    rank += 1;
                    self.apply_and_record(conn, migration, rank).await?;
                    report.applied.push(migration.version);
                }
            }
        }

        tracing::debug!(
            applied = report.applied.len(),
            already_applied = report.already_applied,
            "migration run complete"
        );
        Ok(report)
    }

    async fn ensure_history_table(&self, conn: &dyn Connection) -> Result<()> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             installed_rank INT NOT NULL, \
             version VARCHAR(50) NOT NULL, \
             description VARCHAR(200) NOT NULL, \
             checksum VARCHAR(64) NOT NULL, \
             installed_on TIMESTAMP NOT NULL, \
             success BOOLEAN NOT NULL, \
             PRIMARY KEY (installed_rank))",
            self.table
        );
        conn.execute(&ddl, &[]).await?;
        Ok(())
    }

    /// Load recorded history as a version -> checksum map
    async fn load_history(&self, conn: &dyn Connection) -> Result<HashMap<u32, String>> {
        let sql = format!(
            "SELECT version, checksum FROM {} ORDER BY installed_rank",
            self.table
        );
        let result = conn.query(&sql, &[]).await?;

        let mut history = HashMap::new();
        for row in &result.rows {
            let version = row
                .get_by_name("version")
                .and_then(Value::as_str)
                .and_then(|v| v.parse::<u32>().ok())
                .ok_or_else(|| {
                    HarnessError::Migration("unreadable version in history table".into())
                })?;
            let checksum = row
                .get_by_name("checksum")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    HarnessError::Migration("unreadable checksum in history table".into())
                })?;
            history.insert(version, checksum.to_string());
        }
        Ok(history)
    }

    /// Run one pending migration and its history insert as a unit.
    ///
    /// With transaction support the script and the history row commit or
    /// roll back together. Connections without transactions fall back to
    /// autocommit, where the history row is written last so a failure can
    /// never record an unapplied version. Engines with implicit-commit DDL
    /// keep the weaker guarantee either way.
    async fn apply_and_record(
        &self,
        conn: &dyn Connection,
        migration: &Migration,
        rank: i64,
    ) -> Result<()> {
        match conn.begin_transaction().await {
            Ok(tx) => {
                let result = self
                    .run_script(tx.as_ref(), conn.param_style(), migration, rank)
                    .await;
                match result {
                    Ok(()) => tx.commit().await,
                    Err(e) => {
                        if let Err(rollback) = tx.rollback().await {
                            tracing::warn!(
                                version = migration.version,
                                error = %rollback,
                                "rollback failed after migration error"
                            );
                        }
                        Err(e)
                    }
                }
            }
            Err(HarnessError::NotSupported(_)) => {
                for statement in split_statements(&migration.sql) {
                    conn.execute(&statement, &[])
                        .await
                        .map_err(|e| Self::script_error(migration, e))?;
                }
                let (sql, params) = self.record_statement(conn.param_style(), migration, rank);
                conn.execute(&sql, &params).await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn run_script(
        &self,
        tx: &dyn Transaction,
        style: ParamStyle,
        migration: &Migration,
        rank: i64,
    ) -> Result<()> {
        for statement in split_statements(&migration.sql) {
            tx.execute(&statement, &[])
                .await
                .map_err(|e| Self::script_error(migration, e))?;
        }
        let (sql, params) = self.record_statement(style, migration, rank);
        tx.execute(&sql, &params).await?;
        Ok(())
    }

    fn script_error(migration: &Migration, e: HarnessError) -> HarnessError {
        HarnessError::Migration(format!(
            "migration V{} ({}) failed: {}",
            migration.version, migration.description, e
        ))
    }

    fn record_statement(
        &self,
        style: ParamStyle,
        migration: &Migration,
        rank: i64,
    ) -> (String, Vec<Value>) {
        let sql = format!(
            "INSERT INTO {} (installed_rank, version, description, checksum, installed_on, success) \
             VALUES ({}, {}, {}, {}, CURRENT_TIMESTAMP, TRUE)",
            self.table,
            style.placeholder(1),
            style.placeholder(2),
            style.placeholder(3),
            style.placeholder(4),
        );
        let params = vec![
            Value::Int32(rank as i32),
            Value::String(migration.version.to_string()),
            Value::String(migration.description.clone()),
            Value::String(migration.checksum.clone()),
        ];
        (sql, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dbharness_core::{
        ParamStyle, QueryResult, Row, ServerInfo, StatementResult, Transaction,
    };
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    /// In-memory connection that emulates just enough of the history table
    /// for the migrator to run end to end.
    #[derive(Default)]
    struct FakeHistoryConnection {
        history: Arc<Mutex<Vec<(String, String)>>>,
        executed: Arc<Mutex<Vec<String>>>,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl Connection for FakeHistoryConnection {
        fn driver_name(&self) -> &str {
            "fake"
        }

        fn param_style(&self) -> ParamStyle {
            ParamStyle::Dollar
        }

        async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
            if let Some(needle) = &self.fail_on {
                if sql.contains(needle.as_str()) {
                    return Err(HarnessError::Query(format!("forced failure on {}", needle)));
                }
            }
            self.executed.lock().push(sql.to_string());
            if sql.starts_with("INSERT INTO schema_history") {
                let version = params[1].as_str().unwrap_or_default().to_string();
                let checksum = params[3].as_str().unwrap_or_default().to_string();
                self.history.lock().push((version, checksum));
            }
            Ok(StatementResult {
                affected_rows: 1,
                execution_time_ms: 0,
            })
        }

        async fn query(&self, sql: &str, _params: &[Value]) -> Result<QueryResult> {
            assert!(sql.contains("FROM schema_history"));
            let rows = self
                .history
                .lock()
                .iter()
                .map(|(version, checksum)| {
                    Row::new(
                        vec!["version".into(), "checksum".into()],
                        vec![
                            Value::String(version.clone()),
                            Value::String(checksum.clone()),
                        ],
                    )
                })
                .collect();
            Ok(QueryResult {
                columns: Vec::new(),
                rows,
                affected_rows: 0,
                execution_time_ms: 0,
            })
        }

        async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
            Err(HarnessError::NotSupported("no transactions".into()))
        }

        async fn server_info(&self) -> Result<ServerInfo> {
            Ok(ServerInfo::default())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }

        fn is_closed(&self) -> bool {
            false
        }
    }

    fn sample_migrations() -> Vec<Migration> {
        vec![
            Migration::parse("V1__create_a.sql", "CREATE TABLE a (id INT)").unwrap(),
            Migration::parse("V2__create_b.sql", "CREATE TABLE b (id INT)").unwrap(),
        ]
    }

    #[test]
    fn rejects_duplicate_versions() {
        let dup = vec![
            Migration::parse("V1__a.sql", "SELECT 1").unwrap(),
            Migration::parse("V1__b.sql", "SELECT 2").unwrap(),
        ];
        assert!(Migrator::new(dup).is_err());
    }

    #[tokio::test]
    async fn applies_pending_migrations_in_order() {
        let conn = FakeHistoryConnection::default();
        let migrator = Migrator::new(sample_migrations()).unwrap();

        let report = migrator.migrate(&conn).await.expect("migrate");
        assert_eq!(report.applied, vec![1, 2]);
        assert_eq!(report.already_applied, 0);
        assert!(report.changed());

        let executed = conn.executed.lock().clone();
        let a_pos = executed.iter().position(|s| s.contains("CREATE TABLE a"));
        let b_pos = executed.iter().position(|s| s.contains("CREATE TABLE b"));
        assert!(a_pos.unwrap() < b_pos.unwrap());
    }

    #[tokio::test]
    async fn second_run_is_a_no_op() {
        let conn = FakeHistoryConnection::default();
        let migrator = Migrator::new(sample_migrations()).unwrap();

        migrator.migrate(&conn).await.expect("first run");
        let report = migrator.migrate(&conn).await.expect("second run");

        assert!(report.applied.is_empty());
        assert_eq!(report.already_applied, 2);
        assert!(!report.changed());
    }

    #[tokio::test]
    async fn detects_checksum_drift() {
        let conn = FakeHistoryConnection::default();
        let migrator = Migrator::new(sample_migrations()).unwrap();
        migrator.migrate(&conn).await.expect("first run");

        // Same version, edited script
        let edited =
            vec![Migration::parse("V1__create_a.sql", "CREATE TABLE a (id BIGINT)").unwrap()];
        let migrator = Migrator::new(edited).unwrap();
        let err = migrator.migrate(&conn).await.unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[tokio::test]
    async fn detects_out_of_order_migration() {
        let conn = FakeHistoryConnection::default();
        let only_v2 =
            vec![Migration::parse("V2__create_b.sql", "CREATE TABLE b (id INT)").unwrap()];
        Migrator::new(only_v2).unwrap().migrate(&conn).await.unwrap();

        let migrator = Migrator::new(sample_migrations()).unwrap();
        let err = migrator.migrate(&conn).await.unwrap_err();
        assert!(err.to_string().contains("out of order"));
    }

    #[tokio::test]
    async fn failed_migration_is_not_recorded() {
        let conn = FakeHistoryConnection {
            fail_on: Some("CREATE TABLE b".into()),
            ..Default::default()
        };
        let migrator = Migrator::new(sample_migrations()).unwrap();

        let err = migrator.migrate(&conn).await.unwrap_err();
        assert!(err.to_string().contains("V2"));
        assert_eq!(conn.history.lock().len(), 1);
    }

    /// Transactional connection: statements buffer inside the transaction
    /// and only land in `committed` on commit, like a real server.
    #[derive(Default)]
    struct FakeTxConnection {
        committed: Arc<Mutex<Vec<String>>>,
        fail_on: Option<String>,
    }

    struct FakeTransaction {
        committed: Arc<Mutex<Vec<String>>>,
        buffered: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl Transaction for FakeTransaction {
        async fn commit(self: Box<Self>) -> Result<()> {
            let mut buffered = self.buffered.lock();
            self.committed.lock().append(&mut buffered);
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> Result<()> {
            self.buffered.lock().clear();
            Ok(())
        }

        async fn query(&self, _sql: &str, _params: &[Value]) -> Result<QueryResult> {
            Ok(QueryResult {
                columns: Vec::new(),
                rows: Vec::new(),
                affected_rows: 0,
                execution_time_ms: 0,
            })
        }

        async fn execute(&self, sql: &str, _params: &[Value]) -> Result<StatementResult> {
            if let Some(needle) = &self.fail_on {
                if sql.contains(needle.as_str()) {
                    return Err(HarnessError::Query(format!("forced failure on {}", needle)));
                }
            }
            self.buffered.lock().push(sql.to_string());
            Ok(StatementResult {
                affected_rows: 1,
                execution_time_ms: 0,
            })
        }
    }

    #[async_trait]
    impl Connection for FakeTxConnection {
        fn driver_name(&self) -> &str {
            "fake"
        }

        fn param_style(&self) -> ParamStyle {
            ParamStyle::Dollar
        }

        async fn execute(&self, sql: &str, _params: &[Value]) -> Result<StatementResult> {
            self.committed.lock().push(sql.to_string());
            Ok(StatementResult {
                affected_rows: 1,
                execution_time_ms: 0,
            })
        }

        async fn query(&self, _sql: &str, _params: &[Value]) -> Result<QueryResult> {
            Ok(QueryResult {
                columns: Vec::new(),
                rows: Vec::new(),
                affected_rows: 0,
                execution_time_ms: 0,
            })
        }

        async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
            Ok(Box::new(FakeTransaction {
                committed: Arc::clone(&self.committed),
                buffered: Mutex::new(Vec::new()),
                fail_on: self.fail_on.clone(),
            }))
        }

        async fn server_info(&self) -> Result<ServerInfo> {
            Ok(ServerInfo::default())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }

        fn is_closed(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn migration_script_commits_with_its_history_row() {
        let conn = FakeTxConnection::default();
        let migrator = Migrator::new(sample_migrations()).unwrap();

        migrator.migrate(&conn).await.expect("migrate");

        let committed = conn.committed.lock().clone();
        assert!(committed.iter().any(|s| s.contains("CREATE TABLE a")));
        assert_eq!(
            committed
                .iter()
                .filter(|s| s.starts_with("INSERT INTO schema_history"))
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn failed_migration_rolls_back_earlier_statements() {
        // V2 carries two statements; the second fails, so the first must
        // not survive either.
        let conn = FakeTxConnection {
            fail_on: Some("CREATE TABLE broken".into()),
            ..Default::default()
        };
        let migrations = vec![
            Migration::parse("V1__create_a.sql", "CREATE TABLE a (id INT)").unwrap(),
            Migration::parse(
                "V2__create_b.sql",
                "CREATE TABLE b (id INT);\nCREATE TABLE broken (id INT)",
            )
            .unwrap(),
        ];
        let migrator = Migrator::new(migrations).unwrap();

        let err = migrator.migrate(&conn).await.unwrap_err();
        assert!(err.to_string().contains("V2"));

        let committed = conn.committed.lock().clone();
        assert!(committed.iter().any(|s| s.contains("CREATE TABLE a")));
        assert!(!committed.iter().any(|s| s.contains("CREATE TABLE b ")));
        assert_eq!(
            committed
                .iter()
                .filter(|s| s.starts_with("INSERT INTO schema_history"))
                .count(),
            1,
            "only V1 may be recorded"
        );
    }
}
