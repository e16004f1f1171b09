//! Enhanced database container
//!
//! [`DatabaseContainer`] wraps a running `testcontainers` container with the
//! helpers a database test needs: driver connections, deduplicated pools,
//! a guest-OS probe, in-container package management and ordered lifecycle
//! hooks. One wrapper type serves every engine; the differences live in the
//! [`EngineProfile`] it was started from.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use testcontainers::core::{ExecCommand, IntoContainerPort};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};

use dbharness_core::{
    Connection, ConnectionConfig, DatabaseDriver, HarnessError, Result, Row, ServerInfo, Value,
};
use dbharness_drivers::DriverRegistry;
use dbharness_pool::{
    pool_name, ConnectionFactory, ConnectionPool, PoolConfig, PoolRegistry, PoolSignature,
};

use crate::actions::{PostConstructAction, PreDestroyAction};
use crate::engine::{EngineKind, EngineProfile};
use crate::guest::{parse_os_release, GuestOsDetails, Packaging};
use crate::log::ContainerLogConsumer;

const AVAILABLE_EXTENSIONS_QUERY: &str = "SELECT name, default_version, installed_version, \
     comment FROM pg_catalog.pg_available_extensions ORDER BY name";

const INSTALLED_EXTENSIONS_QUERY: &str = "SELECT name, default_version, installed_version, \
     comment FROM pg_catalog.pg_available_extensions WHERE installed_version IS NOT NULL \
     ORDER BY name";

/// Output of a command executed inside the container.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A missing exit code means the command never finished (still running or
/// killed by the daemon), which must not read as success.
fn require_exit_code(code: Option<i64>) -> Result<i64> {
    code.ok_or_else(|| HarnessError::Container("exec finished without an exit code".to_string()))
}

/// One row of `pg_catalog.pg_available_extensions`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerExtension {
    pub name: String,
    pub default_version: Option<String>,
    pub installed_version: Option<String>,
    pub comment: Option<String>,
}

impl ServerExtension {
    fn from_row(row: &Row) -> Self {
        Self {
            name: column_string(row, 0).unwrap_or_default(),
            default_version: column_string(row, 1),
            installed_version: column_string(row, 2),
            comment: column_string(row, 3),
        }
    }

    pub fn is_installed(&self) -> bool {
        self.installed_version.is_some()
    }
}

fn column_string(row: &Row, index: usize) -> Option<String> {
    match row.get(index) {
        Some(Value::Null) | None => None,
        Some(value) => value.as_str().map(str::to_string).or_else(|| Some(value.to_string())),
    }
}

/// Build the driver connection config for a container reachable at host:port.
fn connection_config_for(profile: &EngineProfile, host: &str, port: u16) -> ConnectionConfig {
    let config = match profile.wire_family().driver_name() {
        Some("mysql") => ConnectionConfig::new_mysql(host, port, &profile.database, &profile.username),
        _ => ConnectionConfig::new_postgres(host, port, &profile.database, &profile.username),
    };
    if profile.password.is_empty() {
        config
    } else {
        config.with_password(&profile.password)
    }
}

fn update_script(packaging: Packaging) -> Option<&'static str> {
    match packaging {
        Packaging::Debian => Some("DEBIAN_FRONTEND=noninteractive apt-get -y update"),
        Packaging::Redhat => Some("dnf -y makecache"),
        Packaging::Alpine => Some("apk update"),
        Packaging::Unknown => None,
    }
}

fn upgrade_script(packaging: Packaging) -> Option<&'static str> {
    match packaging {
        Packaging::Debian => Some("DEBIAN_FRONTEND=noninteractive apt-get -y upgrade"),
        Packaging::Redhat => Some("dnf -y upgrade"),
        Packaging::Alpine => Some("apk upgrade"),
        Packaging::Unknown => None,
    }
}

fn install_script(packaging: Packaging, packages: &[&str]) -> Option<String> {
    if packages.is_empty() {
        return None;
    }
    let list = packages.join(" ");
    match packaging {
        Packaging::Debian => Some(format!(
            "DEBIAN_FRONTEND=noninteractive apt-get -y install {}",
            list
        )),
        Packaging::Redhat => Some(format!("dnf -y install {}", list)),
        Packaging::Alpine => Some(format!("apk add {}", list)),
        Packaging::Unknown => None,
    }
}

/// Connection factory handing the pool fresh driver connections.
struct ContainerConnectionFactory {
    driver: Arc<dyn DatabaseDriver>,
    config: ConnectionConfig,
}

#[async_trait::async_trait]
impl ConnectionFactory for ContainerConnectionFactory {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        self.driver.connect(&self.config).await
    }
}

/// A running database server plus the harness state attached to it.
///
/// Dropping the wrapper removes the container, but [`DatabaseContainer::stop`]
/// should be preferred: it runs pre-destroy actions, evicts this container's
/// pool from the registry and reports connections that were left open.
pub struct DatabaseContainer {
    profile: EngineProfile,
    container: ContainerAsync<GenericImage>,
    host: String,
    port: u16,
    log_consumer: ContainerLogConsumer,
    pool_registry: Arc<PoolRegistry>,
    drivers: Arc<DriverRegistry>,
    guest: tokio::sync::Mutex<Option<GuestOsDetails>>,
    tracked: Mutex<Vec<Arc<dyn Connection>>>,
    pre_destroy: Mutex<Vec<Box<dyn PreDestroyAction>>>,
    stopped: AtomicBool,
}

impl DatabaseContainer {
    /// Start a container for the given profile.
    pub async fn start(profile: EngineProfile, pool_registry: Arc<PoolRegistry>) -> Result<Self> {
        Self::start_with_actions(profile, pool_registry, Vec::new()).await
    }

    /// Start a container and run post-construct actions once it is ready.
    ///
    /// Actions run in registration order; the first failure aborts startup.
    pub async fn start_with_actions(
        profile: EngineProfile,
        pool_registry: Arc<PoolRegistry>,
        actions: Vec<Box<dyn PostConstructAction>>,
    ) -> Result<Self> {
        let log_consumer = ContainerLogConsumer::new(&profile.image_ref());

        tracing::info!(
            engine = %profile.engine,
            image = %profile.image_ref(),
            "starting database container"
        );

        let image = GenericImage::new(profile.image.clone(), profile.tag.clone())
            .with_exposed_port(profile.port.tcp())
            .with_wait_for(profile.wait.clone());

        let mut request = image.with_log_consumer(log_consumer.clone());
        for (key, value) in &profile.env {
            request = request.with_env_var(key, value);
        }
        if !profile.cmd.is_empty() {
            request = request.with_cmd(profile.cmd.clone());
        }

        let container = request.start().await.map_err(|e| {
            HarnessError::Container(format!("failed to start {}: {}", profile.image_ref(), e))
        })?;

        let host = container
            .get_host()
            .await
            .map_err(|e| HarnessError::Container(format!("failed to resolve host: {}", e)))?
            .to_string();
        let port = container
            .get_host_port_ipv4(profile.port.tcp())
            .await
            .map_err(|e| HarnessError::Container(format!("failed to resolve mapped port: {}", e)))?;

        let this = Self {
            profile,
            container,
            host,
            port,
            log_consumer,
            pool_registry,
            drivers: Arc::new(DriverRegistry::with_defaults()),
            guest: tokio::sync::Mutex::new(None),
            tracked: Mutex::new(Vec::new()),
            pre_destroy: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
        };
        this.post_construct(actions).await?;
        Ok(this)
    }

    /// Post-start bookkeeping: open the stdout gate, log what we are
    /// actually running against, then apply the registered actions.
    async fn post_construct(&self, actions: Vec<Box<dyn PostConstructAction>>) -> Result<()> {
        self.log_consumer.set_stdout_enabled(true);

        if self.profile.wire_family().driver_name().is_some() {
            self.wait_until_ready().await?;
        }

        match self.guest_details().await {
            Ok(details) => {
                tracing::info!(
                    engine = %self.profile.engine,
                    image = %self.profile.image_ref(),
                    host = %self.host,
                    port = self.port,
                    guest_os = %format!(
                        "{} {}",
                        details.os_id().unwrap_or("n/a"),
                        details.os_version_id().unwrap_or("n/a")
                    ),
                    server = %format!(
                        "{} {}",
                        details.server.product_name, details.server.product_version
                    ),
                    driver = %format!(
                        "{} {}",
                        details.server.driver_name, details.server.driver_version
                    ),
                    "database container started"
                );
            }
            Err(e) => {
                tracing::warn!(engine = %self.profile.engine, error = %e, "guest probe failed");
            }
        }

        for action in actions {
            tracing::debug!(action = %action.name(), "running post-construct action");
            action.apply(self).await?;
        }
        Ok(())
    }

    /// Retry the profile's test query until the server accepts clients.
    ///
    /// Some images log their wait message before the final server process
    /// listens (MySQL brings up a temporary bootstrap server first), so the
    /// log-based wait alone is not enough.
    async fn wait_until_ready(&self) -> Result<()> {
        const MAX_ATTEMPTS: u32 = 10;
        let mut last_error = None;
        for attempt in 1..=MAX_ATTEMPTS {
            match self.try_test_query().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::debug!(
                        engine = %self.profile.engine,
                        attempt,
                        error = %e,
                        "server not ready yet"
                    );
                    last_error = Some(e);
                }
            }
            tokio::time::sleep(Duration::from_millis(500 * u64::from(attempt))).await;
        }
        Err(last_error.unwrap_or_else(|| {
            HarnessError::Timeout(format!("{} never became ready", self.profile.image_ref()))
        }))
    }

    async fn try_test_query(&self) -> Result<()> {
        let driver = self.driver()?;
        let conn = driver.connect(&self.connection_config()).await?;
        let result = conn.query(&self.profile.test_query, &[]).await;
        conn.close().await?;
        result.map(|_| ())
    }

    pub fn profile(&self) -> &EngineProfile {
        &self.profile
    }

    pub fn engine(&self) -> EngineKind {
        self.profile.engine
    }

    /// Hostname the mapped port is reachable on
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Host port mapped to the server's internal port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Handle to the stdout gate of the attached log consumer
    pub fn log_consumer(&self) -> &ContainerLogConsumer {
        &self.log_consumer
    }

    /// Register an action to run when this container stops.
    pub fn add_pre_destroy_action(&self, action: Box<dyn PreDestroyAction>) {
        self.pre_destroy.lock().push(action);
    }

    fn driver(&self) -> Result<Arc<dyn DatabaseDriver>> {
        let name = self.profile.wire_family().driver_name().ok_or_else(|| {
            HarnessError::NotSupported(format!(
                "no bundled driver speaks the {} wire protocol",
                self.profile.engine
            ))
        })?;
        self.drivers
            .get(name)
            .ok_or_else(|| HarnessError::Driver(format!("driver '{}' is not registered", name)))
    }

    /// Connection config pointing at this container's mapped port.
    pub fn connection_config(&self) -> ConnectionConfig {
        connection_config_for(&self.profile, &self.host, self.port)
    }

    /// Pool identity for this container.
    pub fn pool_signature(&self) -> Result<PoolSignature> {
        let driver = self.driver()?;
        let url = driver.build_connection_string(&self.connection_config());
        Ok(PoolSignature::new(
            driver.name(),
            url,
            &self.profile.username,
            &self.profile.password,
        ))
    }

    /// Open a single-use connection, for initial configuration work.
    ///
    /// The connection is tracked twice over: locally, so this container's
    /// `stop` can report and close what its callers left open, and in the
    /// pool registry, so the end-of-run sweep reaches connections from
    /// containers that were never stopped.
    pub async fn connect(&self) -> Result<Arc<dyn Connection>> {
        let driver = self.driver()?;
        let conn = driver.connect(&self.connection_config()).await?;
        self.tracked.lock().push(Arc::clone(&conn));
        self.pool_registry.track(Arc::clone(&conn));
        Ok(conn)
    }

    /// Shared connection pool for this container, deduplicated by signature.
    pub async fn pool(&self) -> Result<Arc<ConnectionPool>> {
        self.pool_with(PoolConfig::default()).await
    }

    /// Like [`DatabaseContainer::pool`] with explicit pool settings.
    ///
    /// Settings only apply when this call creates the pool; a registry hit
    /// returns the existing pool unchanged.
    pub async fn pool_with(&self, config: PoolConfig) -> Result<Arc<ConnectionPool>> {
        let driver = self.driver()?;
        let signature = self.pool_signature()?;
        let name = pool_name(driver.name(), &self.profile.database);
        let conn_config = self.connection_config();

        Ok(self.pool_registry.get_or_create(signature, move || {
            (
                config.with_name(name),
                ContainerConnectionFactory {
                    driver,
                    config: conn_config,
                },
            )
        }))
    }

    /// Guest OS and server details, probed once and cached.
    ///
    /// The probe runs `cat /etc/os-release` inside the container and asks a
    /// live connection for the server's version report. Pieces that cannot
    /// be gathered (no driver for this engine, exec failure) degrade to
    /// empty defaults rather than failing the call.
    pub async fn guest_details(&self) -> Result<GuestOsDetails> {
        let mut guard = self.guest.lock().await;
        if let Some(details) = guard.as_ref() {
            return Ok(details.clone());
        }

        let os_release = match self.exec(&["cat", "/etc/os-release"]).await {
            Ok(output) if output.success() => parse_os_release(&output.stdout),
            Ok(output) => {
                tracing::warn!(
                    engine = %self.profile.engine,
                    exit_code = output.exit_code,
                    "could not read /etc/os-release"
                );
                Default::default()
            }
            Err(e) => {
                tracing::warn!(engine = %self.profile.engine, error = %e, "guest exec failed");
                Default::default()
            }
        };

        let server = match self.connect().await {
            Ok(conn) => {
                let info = conn.server_info().await.unwrap_or_else(|e| {
                    tracing::warn!(engine = %self.profile.engine, error = %e, "server metadata unavailable");
                    ServerInfo::default()
                });
                conn.close().await?;
                info
            }
            Err(HarnessError::NotSupported(_)) => ServerInfo::default(),
            Err(e) => {
                tracing::warn!(engine = %self.profile.engine, error = %e, "server probe failed");
                ServerInfo::default()
            }
        };

        let details = GuestOsDetails::new(os_release, server);
        *guard = Some(details.clone());
        Ok(details)
    }

    /// Run a command inside the container.
    pub async fn exec(&self, cmd: &[&str]) -> Result<ExecOutput> {
        let command = ExecCommand::new(cmd.iter().map(|s| s.to_string()));
        let mut result = self
            .container
            .exec(command)
            .await
            .map_err(|e| HarnessError::Container(format!("exec failed: {}", e)))?;

        let stdout = result
            .stdout_to_vec()
            .await
            .map_err(|e| HarnessError::Container(format!("exec stdout unavailable: {}", e)))?;
        let stderr = result
            .stderr_to_vec()
            .await
            .map_err(|e| HarnessError::Container(format!("exec stderr unavailable: {}", e)))?;
        let exit_code = require_exit_code(
            result
                .exit_code()
                .await
                .map_err(|e| HarnessError::Container(format!("exec exit code unavailable: {}", e)))?,
        )?;

        Ok(ExecOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }

    async fn run_package_script(&self, script: Option<String>) -> Result<Option<ExecOutput>> {
        let Some(script) = script else {
            tracing::info!(
                engine = %self.profile.engine,
                "guest packaging is unknown, skipping package command"
            );
            return Ok(None);
        };

        match self.exec(&["/bin/sh", "-c", &script]).await {
            Ok(output) => {
                if !output.success() {
                    tracing::warn!(
                        engine = %self.profile.engine,
                        exit_code = output.exit_code,
                        stderr = %output.stderr.trim(),
                        "package command failed"
                    );
                }
                Ok(Some(output))
            }
            Err(e) => {
                tracing::warn!(engine = %self.profile.engine, error = %e, "package command could not run");
                Ok(None)
            }
        }
    }

    /// Refresh the guest's package index.
    pub async fn update_packages(&self) -> Result<Option<ExecOutput>> {
        let packaging = self.guest_details().await?.packaging();
        self.run_package_script(update_script(packaging).map(str::to_string))
            .await
    }

    /// Upgrade all installed packages in the guest.
    pub async fn upgrade_packages(&self) -> Result<Option<ExecOutput>> {
        let packaging = self.guest_details().await?.packaging();
        self.run_package_script(upgrade_script(packaging).map(str::to_string))
            .await
    }

    /// Install packages into the guest, e.g. diagnostic tooling.
    pub async fn install_packages(&self, packages: &[&str]) -> Result<Option<ExecOutput>> {
        let packaging = self.guest_details().await?.packaging();
        self.run_package_script(install_script(packaging, packages))
            .await
    }

    /// Ask the server to reload its configuration without a restart.
    ///
    /// Returns `Ok(None)` for profiles without a soft-bounce command.
    pub async fn soft_bounce(&self) -> Result<Option<ExecOutput>> {
        let Some(cmd) = self.profile.soft_bounce_cmd.clone() else {
            return Ok(None);
        };
        let refs: Vec<&str> = cmd.iter().map(String::as_str).collect();
        let output = self.exec(&refs).await?;
        if !output.success() {
            tracing::warn!(
                engine = %self.profile.engine,
                exit_code = output.exit_code,
                stderr = %output.stderr.trim(),
                "soft bounce failed"
            );
        }
        Ok(Some(output))
    }

    async fn extensions_by_query(&self, sql: &str, params: &[Value]) -> Result<Vec<ServerExtension>> {
        if !self.profile.supports_extensions {
            return Err(HarnessError::NotSupported(format!(
                "{} does not expose pg_available_extensions",
                self.profile.engine
            )));
        }
        let conn = self.connect().await?;
        let result = conn.query(sql, params).await?;
        conn.close().await?;
        Ok(result.rows.iter().map(ServerExtension::from_row).collect())
    }

    /// All extensions the server can load.
    pub async fn available_extensions(&self) -> Result<Vec<ServerExtension>> {
        self.extensions_by_query(AVAILABLE_EXTENSIONS_QUERY, &[]).await
    }

    /// Extensions currently installed in the database.
    pub async fn installed_extensions(&self) -> Result<Vec<ServerExtension>> {
        self.extensions_by_query(INSTALLED_EXTENSIONS_QUERY, &[]).await
    }

    /// Look up one installed extension by name.
    pub async fn find_installed_extension(&self, name: &str) -> Result<Option<ServerExtension>> {
        let sql = "SELECT name, default_version, installed_version, comment \
                   FROM pg_catalog.pg_available_extensions \
                   WHERE installed_version IS NOT NULL AND name = $1";
        let extensions = self
            .extensions_by_query(sql, &[Value::String(name.to_string())])
            .await?;
        Ok(extensions.into_iter().next())
    }

    /// Stop the container after running pre-destroy bookkeeping.
    ///
    /// Order matters: actions may still need connections, so pools are
    /// evicted and stragglers closed after the actions ran. Idempotent.
    pub async fn stop(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let actions: Vec<_> = {
            let mut pending = self.pre_destroy.lock();
            pending.drain(..).collect()
        };
        for action in actions {
            tracing::debug!(action = %action.name(), "running pre-destroy action");
            if let Err(e) = action.apply(self).await {
                tracing::warn!(action = %action.name(), error = %e, "pre-destroy action failed");
            }
        }

        if let Ok(signature) = self.pool_signature() {
            self.pool_registry.evict(&signature).await;
        }

        let tracked: Vec<_> = {
            let mut tracked = self.tracked.lock();
            tracked.drain(..).collect()
        };
        for conn in tracked {
            if !conn.is_closed() {
                tracing::warn!(engine = %self.profile.engine, "a connection was left open");
                if let Err(e) = conn.close().await {
                    tracing::warn!(engine = %self.profile.engine, error = %e, "failed to close connection");
                }
            }
        }

        self.log_consumer.set_stdout_enabled(false);
        tracing::info!(engine = %self.profile.engine, "stopping database container");
        self.container
            .stop()
            .await
            .map_err(|e| HarnessError::Container(format!("failed to stop container: {}", e)))?;
        Ok(())
    }
}

impl std::fmt::Debug for DatabaseContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseContainer")
            .field("engine", &self.profile.engine)
            .field("image", &self.profile.image_ref())
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn exec_output_success_follows_exit_code() {
        let ok = ExecOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
        };
        assert!(ok.success());
        let failed = ExecOutput {
            exit_code: 100,
            stdout: String::new(),
            stderr: "E: Unable to locate package".to_string(),
        };
        assert!(!failed.success());
    }

    #[test]
    fn missing_exit_code_is_an_error() {
        assert_eq!(require_exit_code(Some(0)).ok(), Some(0));
        assert_eq!(require_exit_code(Some(127)).ok(), Some(127));
        let err = require_exit_code(None).unwrap_err();
        assert!(matches!(err, HarnessError::Container(_)), "got {err:?}");
    }

    #[test]
    fn connection_config_targets_mapped_port() {
        let config = connection_config_for(&EngineProfile::postgres(), "127.0.0.1", 54321);
        assert_eq!(config.get_string("host").as_deref(), Some("127.0.0.1"));
        assert_eq!(config.port, 54321);
        assert_eq!(config.get_string("database").as_deref(), Some("test"));
        assert_eq!(config.get_string("password").as_deref(), Some("test"));
    }

    #[test]
    fn insecure_profiles_omit_the_password() {
        let config = connection_config_for(&EngineProfile::cockroachdb(), "localhost", 26257);
        assert_eq!(config.get_string("user").as_deref(), Some("root"));
        assert_eq!(config.get_string("password"), None);
    }

    #[test]
    fn package_scripts_follow_packaging() {
        assert_eq!(
            update_script(Packaging::Debian),
            Some("DEBIAN_FRONTEND=noninteractive apt-get -y update")
        );
        assert_eq!(update_script(Packaging::Alpine), Some("apk update"));
        assert_eq!(update_script(Packaging::Unknown), None);

        assert_eq!(
            install_script(Packaging::Debian, &["less", "procps"]),
            Some("DEBIAN_FRONTEND=noninteractive apt-get -y install less procps".to_string())
        );
        assert_eq!(
            install_script(Packaging::Redhat, &["procps-ng"]),
            Some("dnf -y install procps-ng".to_string())
        );
        assert_eq!(install_script(Packaging::Debian, &[]), None);
        assert_eq!(upgrade_script(Packaging::Unknown), None);
    }

    #[test]
    fn extension_rows_decode_null_versions() {
        let row = Row::new(
            vec![
                "name".to_string(),
                "default_version".to_string(),
                "installed_version".to_string(),
                "comment".to_string(),
            ],
            vec![
                Value::String("pg_stat_statements".to_string()),
                Value::String("1.10".to_string()),
                Value::Null,
                Value::String("track planning and execution statistics".to_string()),
            ],
        );
        let extension = ServerExtension::from_row(&row);
        assert_eq!(extension.name, "pg_stat_statements");
        assert_eq!(extension.default_version.as_deref(), Some("1.10"));
        assert_eq!(extension.installed_version, None);
        assert!(!extension.is_installed());
    }
}
