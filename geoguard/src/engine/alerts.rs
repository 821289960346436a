// geoguard/src/engine/alerts.rs
//
// Security alert delivery. The engine hands each SecurityAlert to a sink;
// transport is the sink's business. Failures are reported back to the engine,
// which logs and counts them without touching the verdict.
//
//   JsonlAlertSink   — append one JSON line per alert to a file
//   LogAlertSink     — structured tracing::warn!
//   MemoryAlertSink  — keep alerts in memory (tests, embedding)

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::error::SinkError;
use crate::events::SecurityAlert;

#[async_trait]
pub trait SecurityAlertSink: Send + Sync {
    async fn emit(&self, alert: &SecurityAlert) -> Result<(), SinkError>;
}

// ── JSONL file ────────────────────────────────────────────────────────────────

pub struct JsonlAlertSink {
    path: PathBuf,
}

impl JsonlAlertSink {
    /// Creates the parent directory if needed.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let path: PathBuf = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SecurityAlertSink for JsonlAlertSink {
    async fn emit(&self, alert: &SecurityAlert) -> Result<(), SinkError> {
        let line = alert.to_jsonl();
        if line.is_empty() {
            return Err(SinkError::Rejected(format!("unserialisable alert for {}", alert.user_id)));
        }
        let line = line + "\n";
        let mut f = OpenOptions::new().create(true).append(true).open(&self.path).await?;
        f.write_all(line.as_bytes()).await?;
        Ok(())
    }
}

// ── tracing ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct LogAlertSink;

#[async_trait]
impl SecurityAlertSink for LogAlertSink {
    async fn emit(&self, alert: &SecurityAlert) -> Result<(), SinkError> {
        warn!(
            user_id     = %alert.user_id,
            severity    = %alert.severity,
            environment = %alert.environment,
            attributes  = ?alert.attributes,
            "{}", alert.title
        );
        Ok(())
    }
}

// ── In-memory ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryAlertSink {
    alerts: Mutex<Vec<SecurityAlert>>,
}

impl MemoryAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<SecurityAlert> {
        self.alerts.lock().clone()
    }

    pub fn len(&self) -> usize { self.alerts.lock().len() }
    pub fn is_empty(&self) -> bool { self.alerts.lock().is_empty() }
}

#[async_trait]
impl SecurityAlertSink for MemoryAlertSink {
    async fn emit(&self, alert: &SecurityAlert) -> Result<(), SinkError> {
        self.alerts.lock().push(alert.clone());
        Ok(())
    }
}
