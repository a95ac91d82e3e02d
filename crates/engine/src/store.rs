use playbar_core::{Album, PlaybackConfig, Track};
use playbar_device::{DeviceEvent, ListenerId, PlayerDevice};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ErrorReporter, PlaybackError, Result};
use crate::poller::{PositionPoller, Tick};
use crate::state::PlaybackState;

type Reply = oneshot::Sender<Result<()>>;
type StateSlot = Arc<Mutex<Option<watch::Sender<PlaybackState>>>>;

#[derive(Debug)]
pub(crate) enum Command {
    Load {
        track: Track,
        album: Album,
        reply: Reply,
    },
    Play {
        reply: Reply,
    },
    Pause {
        reply: Reply,
    },
    SeekTo {
        position_ms: u64,
        reply: Reply,
    },
}

#[derive(Debug)]
pub(crate) enum Message {
    Command(Command),
    Device(DeviceEvent),
    Tick(Tick),
}

/// Single source of truth for what is playing. Commands, device callbacks
/// and poller ticks all funnel into one task that owns the snapshot.
pub struct PlaybackStore {
    inbox: mpsc::UnboundedSender<Message>,
    state_rx: watch::Receiver<PlaybackState>,
    state_tx: StateSlot,
    device: Arc<dyn PlayerDevice>,
    listener: Mutex<Option<ListenerId>>,
    cancel: CancellationToken,
}

impl PlaybackStore {
    /// Must be called inside a tokio runtime.
    pub fn new(
        device: Arc<dyn PlayerDevice>,
        reporter: Arc<dyn ErrorReporter>,
        config: &PlaybackConfig,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(PlaybackState::default());
        let state_tx: StateSlot = Arc::new(Mutex::new(Some(state_tx)));
        let (inbox, messages) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let epoch = Arc::new(AtomicU64::new(0));

        let events = inbox.clone();
        let listener = device.add_listener(Box::new(move |event| {
            let _ = events.send(Message::Device(event));
        }));

        PositionPoller::new(
            device.clone(),
            Duration::from_millis(config.position_poll_ms),
            epoch.clone(),
            inbox.clone(),
            cancel.clone(),
        )
        .spawn();

        let worker = StoreWorker {
            device: device.clone(),
            reporter,
            state: state_tx.clone(),
            epoch,
            cancel: cancel.clone(),
        };
        tokio::spawn(worker.run(messages));

        info!(
            device = device.name(),
            poll_ms = config.position_poll_ms,
            "playback store started"
        );

        Self {
            inbox,
            state_rx,
            state_tx,
            device,
            listener: Mutex::new(Some(listener)),
            cancel,
        }
    }

    pub fn observe(&self) -> watch::Receiver<PlaybackState> {
        let mut rx = self.state_rx.clone();
        rx.borrow_and_update();
        rx
    }

    pub fn current(&self) -> PlaybackState {
        self.state_rx.borrow().clone()
    }

    /// Resets the snapshot to the new track and asks the device to load and
    /// prepare it. Playback does not start.
    pub async fn load(&self, track: Track, album: Album) -> Result<()> {
        self.request(|reply| Command::Load {
            track,
            album,
            reply,
        })
        .await
    }

    /// `is_playing` only flips once the device confirms.
    pub async fn play(&self) -> Result<()> {
        self.request(|reply| Command::Play { reply }).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.request(|reply| Command::Pause { reply }).await
    }

    /// Publishes the new position before the device has seeked.
    pub async fn seek_to(&self, position_ms: u64) -> Result<()> {
        self.request(|reply| Command::SeekTo { position_ms, reply })
            .await
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Detaches from the device and stops the poller and the store task.
    /// Once this returns no snapshot is published again. Safe to call more
    /// than once and from any context.
    pub fn shutdown(&self) {
        let listener = lock(&self.listener).take();
        if let Some(id) = listener {
            self.device.remove_listener(id);
        }
        self.cancel.cancel();
        if lock(&self.state_tx).take().is_some() {
            info!(device = self.device.name(), "playback store shut down");
        }
    }

    async fn request(&self, command: impl FnOnce(Reply) -> Command) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(PlaybackError::Closed);
        }
        let (reply, done) = oneshot::channel();
        self.inbox
            .send(Message::Command(command(reply)))
            .map_err(|_| PlaybackError::Closed)?;
        done.await.map_err(|_| PlaybackError::Closed)?
    }
}

impl Drop for PlaybackStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct StoreWorker {
    device: Arc<dyn PlayerDevice>,
    reporter: Arc<dyn ErrorReporter>,
    state: StateSlot,
    epoch: Arc<AtomicU64>,
    cancel: CancellationToken,
}

impl StoreWorker {
    async fn run(self, mut messages: mpsc::UnboundedReceiver<Message>) {
        loop {
            let message = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                message = messages.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            match message {
                Message::Command(command) => self.on_command(command).await,
                Message::Device(event) => self.on_device_event(event),
                Message::Tick(tick) => self.on_tick(tick),
            }
        }
        debug!("playback store task stopped");
    }

    async fn on_command(&self, command: Command) {
        match command {
            Command::Load {
                track,
                album,
                reply,
            } => {
                info!(track = %track.name, album = %album.album, "loading track");
                let uri = track.src.clone();
                self.replace(|_| PlaybackState::loaded(track, album));
                let result = self.load_source(&uri).await;
                self.advance_epoch();
                let _ = reply.send(result);
            }
            Command::Play { reply } => {
                let result = self.device.play().await.map_err(PlaybackError::from);
                if let Err(err) = &result {
                    warn!(error = %err, "device play failed");
                }
                let _ = reply.send(result);
            }
            Command::Pause { reply } => {
                let result = self.device.pause().await.map_err(PlaybackError::from);
                if let Err(err) = &result {
                    warn!(error = %err, "device pause failed");
                }
                let _ = reply.send(result);
            }
            Command::SeekTo { position_ms, reply } => {
                debug!(position_ms, "seek requested");
                self.replace(|state| state.with_seek(position_ms));
                let result = self
                    .device
                    .seek_to(position_ms)
                    .await
                    .map_err(PlaybackError::from);
                if let Err(err) = &result {
                    warn!(error = %err, position_ms, "device seek failed");
                }
                self.advance_epoch();
                let _ = reply.send(result);
            }
        }
    }

    async fn load_source(&self, uri: &str) -> Result<()> {
        let result = async {
            self.device.set_source(uri).await?;
            self.device.prepare().await
        }
        .await
        .map_err(PlaybackError::from);
        if let Err(err) = &result {
            warn!(error = %err, uri, "device load failed");
        }
        result
    }

    fn on_device_event(&self, event: DeviceEvent) {
        match event {
            DeviceEvent::PlayingChanged(is_playing) => {
                let changed = self.merge(|state| state.with_playing(is_playing));
                debug!(is_playing, changed, "device playing changed");
            }
            DeviceEvent::Error(fault) => {
                self.reporter.report(self.device.name(), &fault);
            }
        }
    }

    fn on_tick(&self, tick: Tick) {
        let current = self.epoch.load(Ordering::Acquire);
        if tick.epoch != current {
            debug!(
                tick_epoch = tick.epoch,
                current_epoch = current,
                "dropping stale position tick"
            );
            return;
        }
        let position = tick.position;
        self.merge(|state| state.with_position(position.position_ms, position.duration_ms));
    }

    // Reads that started before this point carry an older epoch and are
    // dropped on arrival.
    fn advance_epoch(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    fn replace(&self, next: impl FnOnce(&PlaybackState) -> PlaybackState) {
        if self.cancel.is_cancelled() {
            return;
        }
        if let Some(tx) = lock(&self.state).as_ref() {
            let value = next(&*tx.borrow());
            tx.send_replace(value);
        }
    }

    fn merge(&self, next: impl FnOnce(&PlaybackState) -> PlaybackState) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        match lock(&self.state).as_ref() {
            Some(tx) => tx.send_if_modified(|state| {
                let value = next(state);
                if value == *state {
                    false
                } else {
                    *state = value;
                    true
                }
            }),
            None => false,
        }
    }
}
