use crate::{
    DeviceEvent, DeviceFault, DeviceListener, DevicePosition, ListenerId, ListenerSet, PlayerDevice,
};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::debug;
use url::Url;

const SUPPORTED_SCHEMES: [&str; 4] = ["http", "https", "file", "sim"];

#[derive(Default)]
struct Inner {
    source: Option<String>,
    prepared: bool,
    duration_ms: u64,
    playing: bool,
    anchor_ms: u64,
    anchor_at: Option<Instant>,
}

impl Inner {
    fn position_at(&self, now: Instant) -> u64 {
        match (self.playing, self.anchor_at) {
            (true, Some(at)) => {
                let elapsed = now.duration_since(at).as_millis() as u64;
                self.anchor_ms.saturating_add(elapsed).min(self.duration_ms)
            }
            _ => self.anchor_ms,
        }
    }

    // Stops playback once the clock passes the end. Returns true when this
    // call performed the transition.
    fn settle(&mut self, now: Instant) -> bool {
        if self.playing && self.position_at(now) >= self.duration_ms {
            self.anchor_ms = self.duration_ms;
            self.anchor_at = Some(now);
            self.playing = false;
            return true;
        }
        false
    }
}

pub struct SimulatedDevice {
    default_duration_ms: u64,
    inner: Mutex<Inner>,
    listeners: ListenerSet,
}

impl SimulatedDevice {
    pub fn new(default_duration_ms: u64) -> Self {
        Self {
            default_duration_ms,
            inner: Mutex::new(Inner::default()),
            listeners: ListenerSet::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn settle_and_notify(&self) {
        let ended = self.lock().settle(Instant::now());
        if ended {
            debug!("simulated track reached its end");
            self.listeners.emit(DeviceEvent::PlayingChanged(false));
        }
    }

    fn resolve_duration(&self, uri: &str) -> Result<u64, DeviceFault> {
        let parsed = Url::parse(uri)
            .map_err(|err| DeviceFault::new("source_invalid", format!("{uri}: {err}")))?;
        if !SUPPORTED_SCHEMES.contains(&parsed.scheme()) {
            return Err(DeviceFault::new(
                "source_unsupported",
                format!("unsupported scheme {}", parsed.scheme()),
            ));
        }
        let hinted = parsed
            .query_pairs()
            .find(|(k, _)| k == "duration_ms")
            .and_then(|(_, v)| v.parse::<u64>().ok());
        Ok(hinted.unwrap_or(self.default_duration_ms))
    }
}

#[async_trait]
impl PlayerDevice for SimulatedDevice {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn set_source(&self, uri: &str) -> Result<()> {
        let was_playing = {
            let mut inner = self.lock();
            let was_playing = inner.playing;
            *inner = Inner {
                source: Some(uri.to_string()),
                ..Inner::default()
            };
            was_playing
        };
        if was_playing {
            self.listeners.emit(DeviceEvent::PlayingChanged(false));
        }
        Ok(())
    }

    async fn prepare(&self) -> Result<()> {
        let source = self.lock().source.clone();
        let Some(uri) = source.filter(|s| !s.trim().is_empty()) else {
            self.listeners.emit(DeviceEvent::Error(DeviceFault::new(
                "source_missing",
                "prepare called without a source",
            )));
            return Ok(());
        };

        match self.resolve_duration(&uri) {
            Ok(duration_ms) => {
                let mut inner = self.lock();
                inner.prepared = true;
                inner.duration_ms = duration_ms;
                debug!(uri = %uri, duration_ms, "simulated source prepared");
            }
            Err(fault) => self.listeners.emit(DeviceEvent::Error(fault)),
        }
        Ok(())
    }

    async fn play(&self) -> Result<()> {
        let started = {
            let mut inner = self.lock();
            let now = Instant::now();
            if !inner.prepared || inner.playing || inner.anchor_ms >= inner.duration_ms {
                false
            } else {
                inner.playing = true;
                inner.anchor_at = Some(now);
                true
            }
        };
        if started {
            self.listeners.emit(DeviceEvent::PlayingChanged(true));
        }
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.settle_and_notify();
        let stopped = {
            let mut inner = self.lock();
            if inner.playing {
                let now = Instant::now();
                inner.anchor_ms = inner.position_at(now);
                inner.anchor_at = Some(now);
                inner.playing = false;
                true
            } else {
                false
            }
        };
        if stopped {
            self.listeners.emit(DeviceEvent::PlayingChanged(false));
        }
        Ok(())
    }

    async fn seek_to(&self, position_ms: u64) -> Result<()> {
        let mut inner = self.lock();
        if !inner.prepared {
            bail!("seek before prepare");
        }
        inner.anchor_ms = position_ms.min(inner.duration_ms);
        inner.anchor_at = Some(Instant::now());
        Ok(())
    }

    async fn is_playing(&self) -> Result<bool> {
        self.settle_and_notify();
        Ok(self.lock().playing)
    }

    async fn position(&self) -> Result<DevicePosition> {
        self.settle_and_notify();
        let inner = self.lock();
        if !inner.prepared {
            return Err(anyhow!("no prepared source"));
        }
        Ok(DevicePosition {
            position_ms: inner.position_at(Instant::now()),
            duration_ms: inner.duration_ms,
        })
    }

    fn add_listener(&self, listener: DeviceListener) -> ListenerId {
        self.listeners.add(listener)
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::SimulatedDevice;
    use crate::{DeviceEvent, PlayerDevice};
    use std::time::Duration;
    use tokio::sync::mpsc;

    async fn prepared(uri: &str) -> (SimulatedDevice, mpsc::UnboundedReceiver<DeviceEvent>) {
        let device = SimulatedDevice::new(60_000);
        let (tx, rx) = mpsc::unbounded_channel();
        device.add_listener(Box::new(move |event| {
            let _ = tx.send(event);
        }));
        device.set_source(uri).await.unwrap();
        device.prepare().await.unwrap();
        (device, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn position_advances_only_while_playing() {
        let (device, mut rx) = prepared("sim://song?duration_ms=10000").await;

        device.play().await.unwrap();
        assert_eq!(rx.recv().await, Some(DeviceEvent::PlayingChanged(true)));
        tokio::time::advance(Duration::from_millis(2_500)).await;
        device.pause().await.unwrap();
        assert_eq!(rx.recv().await, Some(DeviceEvent::PlayingChanged(false)));

        tokio::time::advance(Duration::from_secs(5)).await;
        let pos = device.position().await.unwrap();
        assert_eq!(pos.position_ms, 2_500);
        assert_eq!(pos.duration_ms, 10_000);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_at_end_of_track() {
        let (device, mut rx) = prepared("sim://short?duration_ms=1000").await;
        device.play().await.unwrap();
        let _ = rx.recv().await;

        tokio::time::advance(Duration::from_secs(3)).await;

        assert!(!device.is_playing().await.unwrap());
        assert_eq!(rx.recv().await, Some(DeviceEvent::PlayingChanged(false)));
        assert_eq!(device.position().await.unwrap().position_ms, 1_000);
    }

    #[tokio::test]
    async fn seek_clamps_to_duration() {
        let (device, _rx) = prepared("sim://song?duration_ms=4000").await;
        device.seek_to(9_000).await.unwrap();
        assert_eq!(device.position().await.unwrap().position_ms, 4_000);
    }

    #[tokio::test]
    async fn unsupported_source_reports_fault() {
        let (device, mut rx) = prepared("ftp://host/song.mp3").await;

        match rx.recv().await {
            Some(DeviceEvent::Error(fault)) => assert_eq!(fault.code, "source_unsupported"),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(device.position().await.is_err());
    }

    #[tokio::test]
    async fn falls_back_to_default_duration() {
        let (device, _rx) = prepared("https://cdn.example.com/a.mp3").await;
        assert_eq!(device.position().await.unwrap().duration_ms, 60_000);
    }
}
