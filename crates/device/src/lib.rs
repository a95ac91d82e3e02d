use anyhow::Result;
use async_trait::async_trait;
use playbar_core::DeviceConfig;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

mod simulated;

pub use simulated::SimulatedDevice;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFault {
    pub code: &'static str,
    pub message: String,
}

impl DeviceFault {
    pub fn new(code: &'static str, message: impl ToString) -> Self {
        Self {
            code,
            message: message.to_string(),
        }
    }
}

impl fmt::Display for DeviceFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    PlayingChanged(bool),
    Error(DeviceFault),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DevicePosition {
    pub position_ms: u64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Callback invoked for each device notification. It runs on whatever
/// thread the device emits from and must not call back into the device.
pub type DeviceListener = Box<dyn Fn(DeviceEvent) + Send + Sync>;

#[async_trait]
pub trait PlayerDevice: Send + Sync {
    fn name(&self) -> &'static str;

    async fn set_source(&self, uri: &str) -> Result<()>;

    /// Starts an asynchronous prepare. Completion is reported through
    /// listeners, either as a playing change or as an error.
    async fn prepare(&self) -> Result<()>;

    async fn play(&self) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    async fn seek_to(&self, position_ms: u64) -> Result<()>;

    async fn is_playing(&self) -> Result<bool>;

    async fn position(&self) -> Result<DevicePosition>;

    fn add_listener(&self, listener: DeviceListener) -> ListenerId;

    fn remove_listener(&self, id: ListenerId);
}

#[derive(Default)]
pub struct ListenerSet {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, DeviceListener)>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: DeviceListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, listener));
        id
    }

    pub fn remove(&self, id: ListenerId) {
        self.lock().retain(|(existing, _)| *existing != id);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn emit(&self, event: DeviceEvent) {
        for (_, listener) in self.lock().iter() {
            listener(event.clone());
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(ListenerId, DeviceListener)>> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub fn build_device(cfg: &DeviceConfig) -> Arc<dyn PlayerDevice> {
    match cfg.kind.as_str() {
        "simulated" => Arc::new(SimulatedDevice::new(cfg.default_duration_ms)),
        other => {
            warn!(kind = other, "unknown device kind; falling back to simulated");
            Arc::new(SimulatedDevice::new(cfg.default_duration_ms))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{build_device, DeviceEvent, ListenerSet};
    use playbar_core::DeviceConfig;
    use tokio::sync::mpsc;

    #[test]
    fn emit_reaches_every_listener() {
        let set = ListenerSet::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        set.add(Box::new(move |event| {
            let _ = tx_a.send(event);
        }));
        set.add(Box::new(move |event| {
            let _ = tx_b.send(event);
        }));

        set.emit(DeviceEvent::PlayingChanged(true));

        assert_eq!(rx_a.try_recv().unwrap(), DeviceEvent::PlayingChanged(true));
        assert_eq!(rx_b.try_recv().unwrap(), DeviceEvent::PlayingChanged(true));
    }

    #[test]
    fn removed_listener_stops_receiving() {
        let set = ListenerSet::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = set.add(Box::new(move |event| {
            let _ = tx.send(event);
        }));
        set.remove(id);

        set.emit(DeviceEvent::PlayingChanged(false));

        assert!(set.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unknown_kind_falls_back_to_simulated() {
        let device = build_device(&DeviceConfig {
            kind: "exoplayer".to_string(),
            default_duration_ms: 1_000,
        });
        assert_eq!(device.name(), "simulated");
    }
}
