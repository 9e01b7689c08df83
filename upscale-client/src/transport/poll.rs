//! Interval polling of the HTTP status endpoint

use futures::FutureExt;
use futures::future::{self, BoxFuture};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use upscale_core::domain::job::ErrorInfo;
use upscale_core::status::{NormalizedStatus, TransportKind, normalize};

use super::{AdapterState, EventSink, TransportAdapter, TransportError, current_runtime};
use crate::UpscaleClient;
use crate::config::{PollConfig, render_template};

/// Polls `endpoint_template` every `interval`
///
/// Each tick emits [`super::TransportSignal::Tick`] before the request goes
/// out, then the normalized answer arrives whenever the request settles. At
/// most one request is outstanding; a tick that finds one still pending is
/// counted but sends nothing. Once the ticks exceed `max_attempts` the loop
/// stops requesting. The adapter keeps polling after a terminal status;
/// stopping it is the tracker's job.
pub struct PollingTransport {
    client: Arc<UpscaleClient>,
    config: PollConfig,
    state: AdapterState,
}

impl PollingTransport {
    pub fn new(client: Arc<UpscaleClient>, config: PollConfig) -> Self {
        Self {
            client,
            config,
            state: AdapterState::Idle,
        }
    }
}

impl TransportAdapter for PollingTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Poll
    }

    fn max_attempts(&self) -> Option<u32> {
        Some(self.config.max_attempts)
    }

    fn start(&mut self, sink: EventSink) -> Result<(), TransportError> {
        self.state.ensure_idle()?;
        let runtime = current_runtime()?;

        let url = render_template(&self.config.endpoint_template, sink.job_id());
        debug!(job_id = %sink.job_id(), url = %url, "Starting status polling");

        let cancel = CancellationToken::new();
        let handle = runtime.spawn(poll_loop(
            Arc::clone(&self.client),
            url,
            self.config.interval,
            self.config.max_attempts,
            sink,
            cancel.clone(),
        ));

        self.state = AdapterState::Running { cancel, handle };
        Ok(())
    }

    fn stop(&mut self) {
        if self.state.shutdown() {
            debug!("Status polling stopped");
        }
    }

    fn is_stopped(&self) -> bool {
        self.state.is_stopped()
    }
}

impl Drop for PollingTransport {
    fn drop(&mut self) {
        self.state.shutdown();
    }
}

/// What woke the poll loop up
enum Step {
    Cancelled,
    Tick,
    Fetched(crate::Result<String>),
}

type StatusFetch = BoxFuture<'static, crate::Result<String>>;

/// Resolves with the in-flight request, or never when there is none
async fn settle(in_flight: &mut Option<StatusFetch>) -> crate::Result<String> {
    match in_flight {
        Some(fetch) => fetch.await,
        None => future::pending().await,
    }
}

async fn poll_loop(
    client: Arc<UpscaleClient>,
    url: String,
    interval: Duration,
    max_attempts: u32,
    sink: EventSink,
    cancel: CancellationToken,
) {
    // first request goes out one interval after start
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut ticks: u32 = 0;
    let mut in_flight: Option<StatusFetch> = None;

    loop {
        // ticks keep coming while a request is outstanding
        let step = tokio::select! {
            biased;
            _ = cancel.cancelled() => Step::Cancelled,
            _ = ticker.tick() => Step::Tick,
            result = settle(&mut in_flight) => Step::Fetched(result),
        };

        match step {
            Step::Cancelled => break,
            Step::Tick => {
                ticks = ticks.saturating_add(1);
                if !sink.tick() {
                    break;
                }

                if ticks > max_attempts {
                    debug!(
                        job_id = %sink.job_id(),
                        generation = sink.generation(),
                        ticks,
                        "Attempt budget spent, no further requests"
                    );
                    break;
                }

                if in_flight.is_some() {
                    debug!(job_id = %sink.job_id(), ticks, "Previous status request still pending");
                    continue;
                }

                let client = Arc::clone(&client);
                let url = url.clone();
                in_flight = Some(async move { client.fetch_status_body(&url).await }.boxed());
            }
            Step::Fetched(result) => {
                in_flight = None;

                let status = match result {
                    Ok(body) => normalize(TransportKind::Poll, &body),
                    Err(e) => {
                        warn!(job_id = %sink.job_id(), error = %e, "Status request failed");
                        NormalizedStatus::Error(
                            ErrorInfo::new("status request failed").with_details(e.to_string()),
                        )
                    }
                };

                debug!(job_id = %sink.job_id(), status = %status, "Polled status");
                if !sink.status(status) {
                    break;
                }
            }
        }
    }
}
