//! Process-wide liveness of the OCR service.
//!
//! A background task probes the service on a fixed interval and stores the
//! answer in a single atomic. Request handlers read it lock-free as a gate:
//! when the service is known to be down, a request fails fast instead of
//! waiting for a connection timeout on every chunk.
//!
//! The flag starts as [`OcrStatus::Unknown`] until the first probe lands.

use crate::pipeline::ocr::OcrBackend;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Last known state of the OCR service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrStatus {
    Online,
    Offline,
    Unknown,
}

impl OcrStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OcrStatus::Online => "online",
            OcrStatus::Offline => "offline",
            OcrStatus::Unknown => "unknown",
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            OcrStatus::Unknown => 0,
            OcrStatus::Online => 1,
            OcrStatus::Offline => 2,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => OcrStatus::Online,
            2 => OcrStatus::Offline,
            _ => OcrStatus::Unknown,
        }
    }
}

impl fmt::Display for OcrStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Holds the liveness flag. Share via `Arc`.
#[derive(Debug)]
pub struct HealthMonitor {
    status: AtomicU8,
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self {
            status: AtomicU8::new(OcrStatus::Unknown.to_u8()),
        }
    }

    pub fn status(&self) -> OcrStatus {
        OcrStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Probe once and store the result.
    pub async fn refresh(&self, backend: &dyn OcrBackend) -> OcrStatus {
        let next = if backend.probe().await {
            OcrStatus::Online
        } else {
            OcrStatus::Offline
        };
        let prev = OcrStatus::from_u8(self.status.swap(next.to_u8(), Ordering::AcqRel));

        match (prev, next) {
            (p, n) if p == n => debug!("OCR service still {}", n),
            (_, OcrStatus::Offline) => warn!("OCR service is offline (was {})", prev),
            (_, n) => info!("OCR service is {} (was {})", n, prev),
        }
        next
    }

    /// Probe on `interval` until the returned handle is dropped.
    /// The first probe runs immediately.
    pub fn spawn(self: &Arc<Self>, backend: Arc<dyn OcrBackend>, interval: Duration) -> MonitorHandle {
        let monitor = Arc::clone(self);
        // `tokio::time::interval` panics on a zero period.
        let interval = interval.max(Duration::from_millis(1));
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                monitor.refresh(backend.as_ref()).await;
            }
        });
        info!("Health monitor started ({:?} interval)", interval);
        MonitorHandle { task }
    }
}

/// Stops the probing task when dropped.
#[derive(Debug)]
pub struct MonitorHandle {
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ocr::tests::ScriptedBackend;

    fn backend(online: bool) -> ScriptedBackend {
        let mut b = ScriptedBackend::new(vec![]);
        b.online = online;
        b
    }

    #[test]
    fn starts_unknown() {
        assert_eq!(HealthMonitor::new().status(), OcrStatus::Unknown);
    }

    #[test]
    fn refresh_follows_probe() {
        let monitor = HealthMonitor::new();
        assert_eq!(tokio_test::block_on(monitor.refresh(&backend(true))), OcrStatus::Online);
        assert_eq!(monitor.status(), OcrStatus::Online);
        tokio_test::block_on(monitor.refresh(&backend(false)));
        assert_eq!(monitor.status(), OcrStatus::Offline);
        tokio_test::block_on(monitor.refresh(&backend(true)));
        assert_eq!(monitor.status(), OcrStatus::Online);
    }

    #[test]
    fn status_serialises_lowercase() {
        assert_eq!(serde_json::to_value(OcrStatus::Offline).unwrap(), "offline");
        assert_eq!(OcrStatus::Unknown.to_string(), "unknown");
    }

    #[tokio::test]
    async fn spawned_monitor_probes_immediately() {
        let monitor = Arc::new(HealthMonitor::new());
        let handle = monitor.spawn(Arc::new(backend(true)), Duration::from_secs(3600));
        for _ in 0..50 {
            if monitor.status() == OcrStatus::Online {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(monitor.status(), OcrStatus::Online);
        assert!(handle.is_running());
    }

    #[tokio::test]
    async fn zero_interval_keeps_monitor_alive() {
        let monitor = Arc::new(HealthMonitor::new());
        let handle = monitor.spawn(Arc::new(backend(false)), Duration::ZERO);
        for _ in 0..50 {
            if monitor.status() == OcrStatus::Offline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(monitor.status(), OcrStatus::Offline);
        assert!(handle.is_running());
    }

    #[tokio::test]
    async fn dropping_handle_stops_probing() {
        let monitor = Arc::new(HealthMonitor::new());
        let probe = Arc::new(backend(false));
        let handle = monitor.spawn(probe.clone(), Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(30)).await;
        drop(handle);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(monitor.status(), OcrStatus::Offline);
        // The aborted task has released its backend.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(Arc::strong_count(&probe), 1);
    }
}
