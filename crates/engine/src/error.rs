use playbar_device::DeviceFault;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("playback store is shut down")]
    Closed,
    #[error("device call failed: {0:#}")]
    Device(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PlaybackError>;

/// Receives device faults. The store only reports; recovery is up to the
/// device.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, device: &str, fault: &DeviceFault);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, device: &str, fault: &DeviceFault) {
        error!(device, code = fault.code, message = %fault.message, "player device error");
    }
}
