//! Per-job push channel

use futures::StreamExt;
use std::time::Duration;
use tokio::time;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use upscale_core::domain::job::ErrorInfo;
use upscale_core::status::{NormalizedStatus, TransportKind, normalize};

use super::{AdapterState, EventSink, TransportAdapter, TransportError, current_runtime};
use crate::config::{PushConfig, render_template};

pub const CHANNEL_CLOSED: &str = "channel closed unexpectedly";

/// Time allowed to send our close frame after the adapter is stopped
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Listens on `channel_template` for status messages about one job
///
/// A channel that cannot be opened, or that ends before a terminal status was
/// delivered, is reported as a synthetic `ERROR` status.
pub struct PushTransport {
    config: PushConfig,
    state: AdapterState,
}

impl PushTransport {
    pub fn new(config: PushConfig) -> Self {
        Self {
            config,
            state: AdapterState::Idle,
        }
    }
}

impl TransportAdapter for PushTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Push
    }

    fn start(&mut self, sink: EventSink) -> Result<(), TransportError> {
        self.state.ensure_idle()?;
        let runtime = current_runtime()?;

        let url = render_template(&self.config.channel_template, sink.job_id());
        debug!(job_id = %sink.job_id(), url = %url, "Opening push channel");

        let cancel = CancellationToken::new();
        let handle = runtime.spawn(listen(url, sink, cancel.clone()));

        self.state = AdapterState::Running { cancel, handle };
        Ok(())
    }

    fn stop(&mut self) {
        if self.state.shutdown() {
            debug!("Push channel closed");
        }
    }

    fn is_stopped(&self) -> bool {
        self.state.is_stopped()
    }
}

impl Drop for PushTransport {
    fn drop(&mut self) {
        self.state.shutdown();
    }
}

async fn listen(url: String, sink: EventSink, cancel: CancellationToken) {
    let connected = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        result = connect_async(url.as_str()) => result,
    };

    let mut ws_stream = match connected {
        Ok((ws_stream, _response)) => ws_stream,
        Err(e) => {
            warn!(job_id = %sink.job_id(), error = %e, "Failed to open push channel");
            sink.status(NormalizedStatus::Error(
                ErrorInfo::new("could not open push channel").with_details(e.to_string()),
            ));
            return;
        }
    };

    info!(job_id = %sink.job_id(), "Push channel open at {}", url);
    let mut delivered_terminal = false;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            frame = ws_stream.next() => Some(frame),
        };

        let Some(frame) = next else {
            match time::timeout(CLOSE_GRACE, ws_stream.close(None)).await {
                Ok(Ok(())) => debug!(job_id = %sink.job_id(), "Push channel closed by client"),
                Ok(Err(e)) => debug!(job_id = %sink.job_id(), error = %e, "Push channel close failed"),
                Err(_) => debug!(job_id = %sink.job_id(), "Push channel close timed out"),
            }
            return;
        };

        match frame {
            Some(Ok(Message::Text(text))) => {
                let status = normalize(TransportKind::Push, &text);
                debug!(job_id = %sink.job_id(), status = %status, "Push message");
                delivered_terminal |= status.is_terminal();
                if !sink.status(status) {
                    return;
                }
            }
            Some(Ok(Message::Binary(_))) => {
                trace!(job_id = %sink.job_id(), "Ignoring binary frame");
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
            Some(Ok(Message::Close(frame))) => {
                debug!(job_id = %sink.job_id(), ?frame, "Push channel closed by server");
                if !delivered_terminal {
                    let details = frame
                        .map(|f| format!("close code {}: {}", u16::from(f.code), f.reason))
                        .unwrap_or_else(|| "no close frame".to_string());
                    sink.status(NormalizedStatus::Error(
                        ErrorInfo::new(CHANNEL_CLOSED).with_details(details),
                    ));
                }
                return;
            }
            Some(Err(e)) => {
                if !delivered_terminal {
                    warn!(job_id = %sink.job_id(), error = %e, "Push channel failed");
                    sink.status(NormalizedStatus::Error(
                        ErrorInfo::new(CHANNEL_CLOSED).with_details(e.to_string()),
                    ));
                }
                return;
            }
            None => {
                if !delivered_terminal {
                    sink.status(NormalizedStatus::error(CHANNEL_CLOSED));
                }
                return;
            }
        }
    }
}
