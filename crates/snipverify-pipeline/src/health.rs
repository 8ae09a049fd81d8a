//! Backend health
//!
//! Process-wide view of whether the sandbox backend is usable, for status
//! displays. Lifecycle is explicit: [`HealthState::init`] once at startup,
//! [`HealthState::refresh`] on demand, [`HealthState::current`] to read.
//! The verification engine never consults it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::Serialize;
use snipverify_sandbox::SharedRuntime;
use std::time::Duration;

/// Bound on a single check
pub const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Something that can report backend health
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// `Ok(message)` when healthy, `Err(message)` otherwise
    async fn check(&self) -> Result<String, String>;
}

/// Checks a sandbox runtime's availability
#[derive(Clone)]
pub struct RuntimeCheck(pub SharedRuntime);

#[async_trait]
impl HealthCheck for RuntimeCheck {
    async fn check(&self) -> Result<String, String> {
        let name = self.0.name();
        if self.0.is_available().await {
            Ok(format!("{name} runtime available"))
        } else {
            Err(format!("{name} runtime unavailable"))
        }
    }
}

/// Last observed health
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    /// Backend usable
    pub ok: bool,
    /// Check message
    pub message: String,
    /// When the check finished
    pub checked_at: DateTime<Utc>,
}

impl HealthStatus {
    async fn observe(check: &dyn HealthCheck) -> Self {
        let (ok, message) = match tokio::time::timeout(CHECK_TIMEOUT, check.check()).await {
            Ok(Ok(message)) => (true, message),
            Ok(Err(message)) => (false, message),
            Err(_) => (false, format!("check timed out after {}s", CHECK_TIMEOUT.as_secs())),
        };
        Self {
            ok,
            message,
            checked_at: Utc::now(),
        }
    }
}

/// Health slot with init/refresh semantics
#[derive(Debug, Default)]
pub struct HealthCell {
    status: RwLock<Option<HealthStatus>>,
}

impl HealthCell {
    /// Empty cell
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check only if nothing has been recorded yet
    pub async fn init(&self, check: &dyn HealthCheck) -> HealthStatus {
        if let Some(status) = self.current() {
            return status;
        }
        self.refresh(check).await
    }

    /// Check and record unconditionally
    pub async fn refresh(&self, check: &dyn HealthCheck) -> HealthStatus {
        let status = HealthStatus::observe(check).await;
        if status.ok {
            tracing::info!(message = %status.message, "backend healthy");
        } else {
            tracing::warn!(message = %status.message, "backend unhealthy");
        }
        *self.status.write() = Some(status.clone());
        status
    }

    /// Last recorded status
    #[must_use]
    pub fn current(&self) -> Option<HealthStatus> {
        self.status.read().clone()
    }
}

static GLOBAL: Lazy<HealthCell> = Lazy::new(HealthCell::new);

/// Process-wide health state
pub struct HealthState;

impl HealthState {
    /// Record initial health (no-op if already initialized)
    pub async fn init(check: &dyn HealthCheck) -> HealthStatus {
        GLOBAL.init(check).await
    }

    /// Re-check and record
    pub async fn refresh(check: &dyn HealthCheck) -> HealthStatus {
        GLOBAL.refresh(check).await
    }

    /// Last recorded health, `None` before `init`
    #[must_use]
    pub fn current() -> Option<HealthStatus> {
        GLOBAL.current()
    }
}
