//! Status transports
//!
//! A transport follows one job and reports what it learns as
//! [`TransportEvent`]s on a channel owned by the tracker. Two variants exist:
//! [`PollingTransport`] asks the status endpoint on a timer and
//! [`PushTransport`] listens on a per-job channel.
//!
//! Every event carries the job id and the generation it was started for, so
//! the tracker can drop anything a superseded adapter emits after teardown.

mod poll;
mod push;

pub use poll::PollingTransport;
pub use push::PushTransport;

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use upscale_core::status::{NormalizedStatus, TransportKind};

use crate::UpscaleClient;
use crate::config::TrackerConfig;

/// Errors raised when an adapter cannot be started
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport already started")]
    AlreadyStarted,

    #[error("transport was stopped and cannot be restarted")]
    Stopped,

    #[error("no async runtime available: {0}")]
    NoRuntime(String),
}

/// What a transport observed
#[derive(Debug, Clone, PartialEq)]
pub enum TransportSignal {
    /// A poll is about to be dispatched
    Tick,
    /// A normalized status arrived
    Status(NormalizedStatus),
}

/// One observation, stamped with its origin
#[derive(Debug, Clone, PartialEq)]
pub struct TransportEvent {
    pub job_id: String,
    pub generation: u64,
    pub signal: TransportSignal,
}

/// Handle an adapter uses to report events for the job it was started for
#[derive(Debug, Clone)]
pub struct EventSink {
    job_id: String,
    generation: u64,
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl EventSink {
    pub fn new(
        job_id: impl Into<String>,
        generation: u64,
        tx: mpsc::UnboundedSender<TransportEvent>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            generation,
            tx,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Sends a signal; returns false once the tracker is gone
    pub fn emit(&self, signal: TransportSignal) -> bool {
        self.tx
            .send(TransportEvent {
                job_id: self.job_id.clone(),
                generation: self.generation,
                signal,
            })
            .is_ok()
    }

    pub fn tick(&self) -> bool {
        self.emit(TransportSignal::Tick)
    }

    pub fn status(&self, status: NormalizedStatus) -> bool {
        self.emit(TransportSignal::Status(status))
    }
}

/// Uniform contract over the polling and push transports
///
/// `start` is called at most once per adapter. `stop` releases every resource
/// the adapter holds and must be a no-op on an adapter that is already
/// stopped or was never started.
pub trait TransportAdapter: Send {
    fn kind(&self) -> TransportKind;

    /// Tick budget before the job times out, for transports that tick
    fn max_attempts(&self) -> Option<u32> {
        None
    }

    fn start(&mut self, sink: EventSink) -> Result<(), TransportError>;

    fn stop(&mut self);

    fn is_stopped(&self) -> bool;
}

/// Builds a fresh adapter for every tracked job
pub trait TransportFactory: Send {
    fn create(&self) -> Box<dyn TransportAdapter>;
}

/// Factory for the real HTTP and channel transports
pub struct HttpTransportFactory {
    client: Arc<UpscaleClient>,
    config: TrackerConfig,
}

impl HttpTransportFactory {
    pub fn new(client: Arc<UpscaleClient>, config: TrackerConfig) -> Self {
        Self { client, config }
    }
}

impl TransportFactory for HttpTransportFactory {
    fn create(&self) -> Box<dyn TransportAdapter> {
        match self.config.transport {
            TransportKind::Poll => Box::new(PollingTransport::new(
                Arc::clone(&self.client),
                self.config.poll.clone(),
            )),
            TransportKind::Push => Box::new(PushTransport::new(self.config.push.clone())),
        }
    }
}

/// Lifecycle shared by both adapters
#[derive(Debug, Default)]
enum AdapterState {
    #[default]
    Idle,
    Running {
        cancel: tokio_util::sync::CancellationToken,
        handle: tokio::task::JoinHandle<()>,
    },
    Stopped,
}

impl AdapterState {
    fn ensure_idle(&self) -> Result<(), TransportError> {
        match self {
            AdapterState::Idle => Ok(()),
            AdapterState::Running { .. } => Err(TransportError::AlreadyStarted),
            AdapterState::Stopped => Err(TransportError::Stopped),
        }
    }

    /// Cancels the background task if one runs; returns true if it did
    ///
    /// The task is detached rather than aborted so it can release its
    /// connection cleanly. It emits nothing once cancelled.
    fn shutdown(&mut self) -> bool {
        match std::mem::replace(self, AdapterState::Stopped) {
            AdapterState::Running { cancel, handle } => {
                cancel.cancel();
                drop(handle);
                true
            }
            AdapterState::Idle | AdapterState::Stopped => false,
        }
    }

    fn is_stopped(&self) -> bool {
        matches!(self, AdapterState::Stopped)
    }
}

fn current_runtime() -> Result<tokio::runtime::Handle, TransportError> {
    tokio::runtime::Handle::try_current().map_err(|e| TransportError::NoRuntime(e.to_string()))
}
