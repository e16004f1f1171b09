//! Engine profiles for the supported database servers
//!
//! Instead of one wrapper type per engine, a single [`EngineProfile`] value
//! captures everything that differs between servers: image coordinates, the
//! internal port, environment variables, the startup wait condition and the
//! default credentials. [`crate::DatabaseContainer`] consumes a profile and
//! behaves identically for every engine.

use testcontainers::core::WaitFor;

/// The database engines this crate knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    Postgres,
    Timescale,
    CockroachDb,
    YugabyteDb,
    QuestDb,
    MySql,
    MariaDb,
    TiDb,
    OceanBase,
    ClickHouse,
    SqlServer,
    Oracle,
    Db2,
    Trino,
}

impl EngineKind {
    /// Stable lowercase identifier, used in log fields and env-var lookups.
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Postgres => "postgres",
            EngineKind::Timescale => "timescale",
            EngineKind::CockroachDb => "cockroachdb",
            EngineKind::YugabyteDb => "yugabytedb",
            EngineKind::QuestDb => "questdb",
            EngineKind::MySql => "mysql",
            EngineKind::MariaDb => "mariadb",
            EngineKind::TiDb => "tidb",
            EngineKind::OceanBase => "oceanbase",
            EngineKind::ClickHouse => "clickhouse",
            EngineKind::SqlServer => "sqlserver",
            EngineKind::Oracle => "oracle",
            EngineKind::Db2 => "db2",
            EngineKind::Trino => "trino",
        }
    }

    /// Which client wire protocol the engine speaks.
    pub fn wire_family(&self) -> WireFamily {
        match self {
            EngineKind::Postgres
            | EngineKind::Timescale
            | EngineKind::CockroachDb
            | EngineKind::YugabyteDb
            | EngineKind::QuestDb => WireFamily::Postgres,
            EngineKind::MySql | EngineKind::MariaDb | EngineKind::TiDb | EngineKind::OceanBase => {
                WireFamily::MySql
            }
            EngineKind::ClickHouse
            | EngineKind::SqlServer
            | EngineKind::Oracle
            | EngineKind::Db2
            | EngineKind::Trino => WireFamily::Other,
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client protocol family an engine is reachable over.
///
/// Engines in the `Other` family get full container lifecycle support
/// (start, stop, exec, guest probe) but no bundled driver, so datasource
/// helpers on those containers return `HarnessError::NotSupported`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFamily {
    Postgres,
    MySql,
    Other,
}

impl WireFamily {
    /// Name of the registered driver serving this family, if any.
    pub fn driver_name(&self) -> Option<&'static str> {
        match self {
            WireFamily::Postgres => Some("postgres"),
            WireFamily::MySql => Some("mysql"),
            WireFamily::Other => None,
        }
    }
}

/// Everything needed to start and talk to one database engine.
///
/// The constructors bake in the image tags and credentials the harness is
/// routinely tested against; the `with_*` builders override individual
/// fields when a test needs something else.
#[derive(Debug, Clone)]
pub struct EngineProfile {
    pub engine: EngineKind,
    /// Image name without the tag, e.g. `cockroachdb/cockroach`
    pub image: String,
    pub tag: String,
    /// Port the server listens on inside the container
    pub port: u16,
    pub env: Vec<(String, String)>,
    /// Command-line override, empty to keep the image default
    pub cmd: Vec<String>,
    pub wait: WaitFor,
    pub database: String,
    pub username: String,
    pub password: String,
    /// Cheap statement used to verify a connection is live
    pub test_query: String,
    /// In-container command for a config reload without a restart
    pub soft_bounce_cmd: Option<Vec<String>>,
    /// Whether the server exposes `pg_catalog.pg_available_extensions`
    pub supports_extensions: bool,
}

impl EngineProfile {
    fn new(engine: EngineKind, image: &str, tag: &str, port: u16, wait: WaitFor) -> Self {
        Self {
            engine,
            image: image.to_string(),
            tag: tag.to_string(),
            port,
            env: Vec::new(),
            cmd: Vec::new(),
            wait,
            database: "test".to_string(),
            username: "test".to_string(),
            password: "test".to_string(),
            test_query: "SELECT 1".to_string(),
            soft_bounce_cmd: None,
            supports_extensions: false,
        }
    }

    pub fn postgres() -> Self {
        let mut profile = Self::new(
            EngineKind::Postgres,
            "postgres",
            "16.3",
            5432,
            WaitFor::message_on_stderr("database system is ready to accept connections"),
        );
        profile.env = vec![
            ("POSTGRES_DB".into(), "test".into()),
            ("POSTGRES_USER".into(), "test".into()),
            ("POSTGRES_PASSWORD".into(), "test".into()),
        ];
        // config reload over the local socket, no restart
        profile.soft_bounce_cmd = Some(vec![
            "psql".into(),
            "-U".into(),
            "test".into(),
            "-d".into(),
            "test".into(),
            "-c".into(),
            "SELECT pg_reload_conf()".into(),
        ]);
        profile.supports_extensions = true;
        profile
    }

    pub fn timescale() -> Self {
        let mut profile = Self::postgres();
        profile.engine = EngineKind::Timescale;
        profile.image = "timescale/timescaledb".to_string();
        profile.tag = "2.15.3".to_string();
        profile
    }

    pub fn cockroachdb() -> Self {
        let mut profile = Self::new(
            EngineKind::CockroachDb,
            "cockroachdb/cockroach",
            "v23.2.8",
            26257,
            WaitFor::message_on_stdout("CockroachDB node starting"),
        );
        profile.cmd = vec!["start-single-node".into(), "--insecure".into()];
        profile.database = "defaultdb".to_string();
        profile.username = "root".to_string();
        profile.password = String::new();
        profile
    }

    pub fn yugabytedb() -> Self {
        let mut profile = Self::new(
            EngineKind::YugabyteDb,
            "yugabytedb/yugabyte",
            "2.20.5.0-b72",
            5433,
            WaitFor::message_on_stdout("Data placement constraint successfully verified"),
        );
        profile.cmd = vec!["bin/yugabyted".into(), "start".into(), "--daemon=false".into()];
        profile.database = "yugabyte".to_string();
        profile.username = "yugabyte".to_string();
        profile.password = "yugabyte".to_string();
        profile
    }

    pub fn questdb() -> Self {
        let mut profile = Self::new(
            EngineKind::QuestDb,
            "questdb/questdb",
            "8.0.3",
            8812,
            WaitFor::message_on_stdout("server-main enjoy"),
        );
        profile.database = "qdb".to_string();
        profile.username = "admin".to_string();
        profile.password = "quest".to_string();
        profile
    }

    pub fn mysql() -> Self {
        let mut profile = Self::new(
            EngineKind::MySql,
            "mysql",
            "9.0.0",
            3306,
            WaitFor::message_on_stderr("ready for connections"),
        );
        profile.env = vec![
            ("MYSQL_DATABASE".into(), "test".into()),
            ("MYSQL_USER".into(), "test".into()),
            ("MYSQL_PASSWORD".into(), "test".into()),
            ("MYSQL_ROOT_PASSWORD".into(), "test".into()),
        ];
        profile
    }

    pub fn mariadb() -> Self {
        let mut profile = Self::new(
            EngineKind::MariaDb,
            "mariadb",
            "11.4.2",
            3306,
            WaitFor::message_on_stderr("ready for connections"),
        );
        profile.env = vec![
            ("MARIADB_DATABASE".into(), "test".into()),
            ("MARIADB_USER".into(), "test".into()),
            ("MARIADB_PASSWORD".into(), "test".into()),
            ("MARIADB_ROOT_PASSWORD".into(), "test".into()),
        ];
        profile
    }

    pub fn tidb() -> Self {
        let mut profile = Self::new(
            EngineKind::TiDb,
            "pingcap/tidb",
            "v8.2.0",
            4000,
            WaitFor::message_on_stderr("server is running MySQL protocol"),
        );
        profile.username = "root".to_string();
        profile.password = String::new();
        profile
    }

    pub fn oceanbase() -> Self {
        let mut profile = Self::new(
            EngineKind::OceanBase,
            "oceanbase/oceanbase-ce",
            "4.3.0",
            2881,
            WaitFor::message_on_stdout("boot success!"),
        );
        profile.username = "root".to_string();
        profile.password = String::new();
        profile
    }

    pub fn clickhouse() -> Self {
        let mut profile = Self::new(
            EngineKind::ClickHouse,
            "yandex/clickhouse-server",
            "21.3.20.1",
            8123,
            WaitFor::message_on_stdout("Ready for connections"),
        );
        profile.database = "default".to_string();
        profile.username = "default".to_string();
        profile.password = String::new();
        profile
    }

    pub fn sqlserver() -> Self {
        let mut profile = Self::new(
            EngineKind::SqlServer,
            "mcr.microsoft.com/mssql/server",
            "2022-latest",
            1433,
            WaitFor::message_on_stdout("SQL Server is now ready for client connections"),
        );
        profile.env = vec![
            ("ACCEPT_EULA".into(), "Y".into()),
            ("MSSQL_SA_PASSWORD".into(), "A_Str0ng_Required_Password".into()),
        ];
        profile.database = "master".to_string();
        profile.username = "sa".to_string();
        profile.password = "A_Str0ng_Required_Password".to_string();
        profile
    }

    pub fn oracle() -> Self {
        let mut profile = Self::new(
            EngineKind::Oracle,
            "gvenzl/oracle-xe",
            "21-slim-faststart",
            1521,
            WaitFor::message_on_stdout("DATABASE IS READY TO USE!"),
        );
        profile.env = vec![("ORACLE_PASSWORD".into(), "test".into())];
        profile.database = "xepdb1".to_string();
        profile.username = "system".to_string();
        profile.test_query = "SELECT 1 FROM DUAL".to_string();
        profile
    }

    pub fn db2() -> Self {
        let mut profile = Self::new(
            EngineKind::Db2,
            "ibmcom/db2",
            "11.5.8.0",
            50000,
            WaitFor::message_on_stdout("Setup has completed"),
        );
        profile.env = vec![
            ("LICENSE".into(), "accept".into()),
            ("DB2INST1_PASSWORD".into(), "test".into()),
            ("DBNAME".into(), "testdb".into()),
        ];
        profile.database = "testdb".to_string();
        profile.username = "db2inst1".to_string();
        profile.test_query = "SELECT 1 FROM SYSIBM.SYSDUMMY1".to_string();
        profile
    }

    pub fn trino() -> Self {
        let mut profile = Self::new(
            EngineKind::Trino,
            "trinodb/trino",
            "452",
            8080,
            WaitFor::message_on_stdout("SERVER STARTED"),
        );
        profile.database = "memory".to_string();
        profile.username = "trino".to_string();
        profile.password = String::new();
        profile
    }

    /// Full image reference, e.g. `postgres:16.3`
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }

    pub fn wire_family(&self) -> WireFamily {
        self.engine.wire_family()
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn with_soft_bounce_cmd(mut self, cmd: Vec<String>) -> Self {
        self.soft_bounce_cmd = Some(cmd);
        self
    }
}
