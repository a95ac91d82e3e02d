use playbar_device::{DevicePosition, PlayerDevice};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::store::Message;

/// One device reading, stamped with the command epoch observed before the
/// read started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub epoch: u64,
    pub position: DevicePosition,
}

pub struct PositionPoller {
    device: Arc<dyn PlayerDevice>,
    period: Duration,
    epoch: Arc<AtomicU64>,
    inbox: UnboundedSender<Message>,
    cancel: CancellationToken,
}

impl PositionPoller {
    pub(crate) fn new(
        device: Arc<dyn PlayerDevice>,
        period: Duration,
        epoch: Arc<AtomicU64>,
        inbox: UnboundedSender<Message>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            device,
            period: period.max(Duration::from_millis(1)),
            epoch,
            inbox,
            cancel,
        }
    }

    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(period_ms = self.period.as_millis() as u64, "position poller started");

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            if let Some(tick) = self.poll_once().await {
                if self.inbox.send(Message::Tick(tick)).is_err() {
                    break;
                }
            }
        }

        debug!("position poller stopped");
    }

    // Reads both fields or nothing. Read failures only cost this tick.
    async fn poll_once(&self) -> Option<Tick> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let epoch = self.epoch.load(Ordering::Acquire);

        match self.device.is_playing().await {
            Ok(true) => {}
            Ok(false) => return None,
            Err(err) => {
                debug!(error = %err, "is_playing read failed; skipping tick");
                return None;
            }
        }

        if self.cancel.is_cancelled() {
            return None;
        }
        match self.device.position().await {
            Ok(position) => {
                trace!(
                    epoch,
                    position_ms = position.position_ms,
                    duration_ms = position.duration_ms,
                    "position tick"
                );
                Some(Tick { epoch, position })
            }
            Err(err) => {
                debug!(error = %err, "position read failed; skipping tick");
                None
            }
        }
    }
}
