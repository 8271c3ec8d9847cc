//! Server implementation

use crate::config::ServerConfig;
use crate::http_server::{self, AppState};
use crate::security::{hash_password, principal::roles};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use testshaper_core::{Error, IdentityRecord, Result, SystemClock};
use testshaper_storage::{IdentityStore, StorageEngine, StorageOptions};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// TestShaper security server
pub struct Server {
    /// Server configuration
    config: ServerConfig,

    /// Storage engine backing policies and identities
    storage: Arc<StorageEngine>,

    /// Wired security services
    state: AppState,

    /// Running state
    running: AtomicBool,

    /// Address the HTTP listener is bound to
    local_addr: Mutex<Option<SocketAddr>>,

    /// HTTP server and maintenance task handles
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: ServerConfig) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.data_dir)?;

        let options = StorageOptions::for_production(config.data_dir.join("db"))
            .sync_wal(config.sync_writes);
        let storage = Arc::new(StorageEngine::open(options)?);

        let state = AppState::new(
            &config,
            storage.clone(),
            storage.clone(),
            Arc::new(SystemClock),
        )?;

        let server = Self {
            config,
            storage,
            state,
            running: AtomicBool::new(false),
            local_addr: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        };
        server.bootstrap_admin()?;
        Ok(server)
    }

    /// Create the configured super administrator if it does not exist yet
    fn bootstrap_admin(&self) -> Result<()> {
        let (Some(email), Some(password)) =
            (&self.config.admin_email, &self.config.admin_password)
        else {
            return Ok(());
        };

        if self.storage.find_by_identifier(email)?.is_some() {
            debug!("Administrator {} already exists", email);
            return Ok(());
        }

        self.state.policy.validate_password(None, password)?;
        let record = IdentityRecord::new(email.as_str(), hash_password(password)?)
            .with_role(roles::SUPER_ADMIN);
        self.storage.create(&record)?;

        info!("Created administrator {}", email);
        Ok(())
    }

    /// Get the configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the wired security services
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Address the HTTP API listens on, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Check if server is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the server
    pub async fn start(&self) -> Result<()> {
        if self.is_running() {
            return Err(Error::Configuration("Server already running".to_string()));
        }

        info!("Starting TestShaper security server...");
        info!("Data directory: {:?}", self.config.data_dir);

        let router = http_server::create_router(self.state.clone());
        let addr = format!("{}:{}", self.config.bind_address, self.config.http_port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(Error::Io)?;
        let bound = listener.local_addr().map_err(Error::Io)?;

        info!("HTTP server listening on {}", bound);

        let http = tokio::spawn(async move {
            let service = router.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, service).await {
                warn!("HTTP server error: {}", e);
            }
        });

        let rate_limiter = self.state.rate_limiter.clone();
        let period = Duration::from_secs(self.config.rate_limit_purge_interval_secs.max(1));
        let purge = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let purged = rate_limiter.purge_expired();
                if purged > 0 {
                    debug!("Purged {} idle rate limit counters", purged);
                }
            }
        });

        *self.local_addr.lock() = Some(bound);
        self.tasks.lock().extend([http, purge]);
        self.running.store(true, Ordering::SeqCst);

        info!("TestShaper security server started successfully");
        Ok(())
    }

    /// Stop the server
    pub async fn stop(&self) -> Result<()> {
        if !self.is_running() {
            return Err(Error::Configuration("Server not running".to_string()));
        }

        info!("Stopping TestShaper security server...");

        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        *self.local_addr.lock() = None;

        // Flush data
        self.storage.flush()?;

        self.running.store(false, Ordering::SeqCst);

        info!("TestShaper security server stopped");
        Ok(())
    }

    /// Get server version
    pub fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }
}
