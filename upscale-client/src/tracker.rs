//! Job lifecycle tracker
//!
//! Owns at most one job and the adapter following it. Transport events are
//! delivered one at a time through [`JobLifecycleTracker::handle_event`];
//! every event is checked against the job id and generation the current
//! adapter was started with before it can touch the job.
//!
//! Superseding a job (calling `track` again) or halting stops the current
//! adapter and drops it before anything new is constructed, so a late event
//! from the old adapter can only ever be discarded.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use upscale_core::domain::job::{ErrorInfo, Job, JobState};
use upscale_core::reconcile::{Reconciliation, reconcile};
use upscale_core::status::NormalizedStatus;

use crate::UpscaleClient;
use crate::config::TrackerConfig;
use crate::tasks::SubmittedJob;
use crate::transport::{
    EventSink, HttpTransportFactory, TransportAdapter, TransportEvent, TransportFactory,
    TransportSignal,
};

/// What presentation code sees of the tracked job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub job_id: String,
    pub state: JobState,
    pub progress_percent: Option<u8>,
    pub attempt_count: Option<u32>,
    pub error: Option<ErrorInfo>,
}

impl JobSnapshot {
    fn of(job: &Job) -> Self {
        Self {
            job_id: job.id().to_string(),
            state: job.state(),
            progress_percent: job.progress_percent(),
            attempt_count: job.attempt_count(),
            error: job.error_info().cloned(),
        }
    }
}

/// Outcome of delivering one event to the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDisposition {
    /// The event was applied; carries the job's state afterwards
    Applied(JobState),
    /// The event was dropped without touching any job
    Discarded(DiscardReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Nothing is being tracked
    NoActiveJob,
    /// The event came from an adapter that was already torn down
    Superseded,
    /// The job already reached a terminal state
    AlreadyTerminal,
    /// A tick from a transport without an attempt budget
    Untracked,
}

struct TrackedJob {
    job: Job,
    generation: u64,
    adapter: Option<Box<dyn TransportAdapter>>,
    max_attempts: Option<u32>,
}

impl TrackedJob {
    /// Stops and drops the adapter, if it is still held
    fn release_adapter(&mut self) {
        if let Some(mut adapter) = self.adapter.take() {
            adapter.stop();
        }
    }
}

/// Drives one remote job from submission to a terminal state
pub struct JobLifecycleTracker {
    factory: Box<dyn TransportFactory>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
    generation: u64,
    current: Option<TrackedJob>,
    /// Id of the job whose adapter was stopped most recently
    last_stopped: Option<String>,
    snapshot_tx: watch::Sender<Option<JobSnapshot>>,
}

impl JobLifecycleTracker {
    pub fn new(factory: impl TransportFactory + 'static) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, _) = watch::channel(None);

        Self {
            factory: Box::new(factory),
            events_tx,
            events_rx,
            generation: 0,
            current: None,
            last_stopped: None,
            snapshot_tx,
        }
    }

    /// Tracker using the HTTP polling or push transport named in `config`
    pub fn with_http(client: Arc<UpscaleClient>, config: TrackerConfig) -> Self {
        Self::new(HttpTransportFactory::new(client, config))
    }

    /// Starts tracking a freshly submitted job, superseding any current one
    ///
    /// Returns the state of the new job once its adapter has been started.
    pub fn track(&mut self, submitted: SubmittedJob) -> JobState {
        self.teardown_current();

        self.generation += 1;
        let generation = self.generation;

        let mut adapter = self.factory.create();
        let max_attempts = adapter.max_attempts();

        let mut job = Job::new(submitted.job_id, submitted.scale_factor);
        if max_attempts.is_some() {
            job.reset_attempts();
        }

        info!(
            job_id = %job.id(),
            generation,
            transport = %adapter.kind(),
            "Tracking job"
        );

        let sink = EventSink::new(job.id(), generation, self.events_tx.clone());
        let adapter = match adapter.start(sink) {
            Ok(()) => {
                apply_or_log(&mut job, NormalizedStatus::Pending);
                Some(adapter)
            }
            Err(e) => {
                warn!(job_id = %job.id(), error = %e, "Failed to start transport");
                adapter.stop();
                let info =
                    ErrorInfo::new("could not start status transport").with_details(e.to_string());
                if let Err(e) = job.fail(info) {
                    debug!(error = %e, "Job already terminal");
                }
                None
            }
        };

        let state = job.state();
        self.current = Some(TrackedJob {
            job,
            generation,
            adapter,
            max_attempts,
        });
        self.publish();
        state
    }

    /// Stops the current adapter and forgets the job
    pub fn halt(&mut self) {
        if let Some(job_id) = self.teardown_current() {
            info!(job_id = %job_id, "Tracking halted");
        }
        self.snapshot_tx.send_replace(None);
    }

    /// Applies one transport event
    pub fn handle_event(&mut self, event: TransportEvent) -> EventDisposition {
        let disposition = self.dispatch(event);
        if matches!(disposition, EventDisposition::Applied(_)) {
            self.publish();
        }
        disposition
    }

    /// Applies every event already waiting, without blocking
    pub fn process_pending(&mut self) -> Vec<EventDisposition> {
        let mut dispositions = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            dispositions.push(self.handle_event(event));
        }
        dispositions
    }

    /// Waits for the next event and applies it
    ///
    /// Returns `None` when nothing is being tracked.
    pub async fn next_event(&mut self) -> Option<EventDisposition> {
        self.current.as_ref()?;
        let event = self.events_rx.recv().await?;
        Some(self.handle_event(event))
    }

    /// Drives the current job until it reaches a terminal state
    ///
    /// Returns `None` when nothing is being tracked.
    pub async fn run_until_terminal(&mut self) -> Option<JobState> {
        loop {
            let state = self.state()?;
            if state.is_terminal() {
                return Some(state);
            }
            self.next_event().await?;
        }
    }

    pub fn job(&self) -> Option<&Job> {
        self.current.as_ref().map(|tracked| &tracked.job)
    }

    pub fn state(&self) -> Option<JobState> {
        self.job().map(Job::state)
    }

    pub fn snapshot(&self) -> Option<JobSnapshot> {
        self.job().map(JobSnapshot::of)
    }

    /// Receives a snapshot after every applied transition
    pub fn subscribe(&self) -> watch::Receiver<Option<JobSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    /// Best methods and rankings for a successful job
    pub fn reconciliation(&self) -> Option<Reconciliation> {
        let results = self.job()?.result_set()?;
        reconcile(results).ok()
    }

    /// Returns true while an adapter is held for the current job
    pub fn has_active_transport(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|tracked| tracked.adapter.is_some())
    }

    fn dispatch(&mut self, event: TransportEvent) -> EventDisposition {
        let Some(tracked) = self.current.as_mut() else {
            debug!(job_id = %event.job_id, "Event with no tracked job");
            return EventDisposition::Discarded(DiscardReason::NoActiveJob);
        };

        if event.job_id != tracked.job.id() || event.generation != tracked.generation {
            if self.last_stopped.as_deref() == Some(event.job_id.as_str()) {
                debug!(
                    job_id = %event.job_id,
                    generation = event.generation,
                    "Discarding event from stopped transport"
                );
            } else {
                warn!(
                    job_id = %event.job_id,
                    generation = event.generation,
                    current = %tracked.job.id(),
                    "Discarding event for unknown job"
                );
            }
            return EventDisposition::Discarded(DiscardReason::Superseded);
        }

        if tracked.job.is_terminal() || tracked.adapter.is_none() {
            debug!(job_id = %event.job_id, "Discarding event after terminal state");
            return EventDisposition::Discarded(DiscardReason::AlreadyTerminal);
        }

        let state = match event.signal {
            TransportSignal::Tick => {
                let Some(max_attempts) = tracked.max_attempts else {
                    return EventDisposition::Discarded(DiscardReason::Untracked);
                };

                let attempts = tracked.job.record_attempt();
                if attempts > max_attempts {
                    warn!(
                        job_id = %tracked.job.id(),
                        attempts,
                        max_attempts,
                        "Job timed out"
                    );
                    match tracked.job.time_out(max_attempts) {
                        Ok(state) => state,
                        Err(e) => {
                            debug!(error = %e, "Job already terminal");
                            tracked.job.state()
                        }
                    }
                } else {
                    tracked.job.state()
                }
            }
            TransportSignal::Status(status) => {
                debug!(job_id = %tracked.job.id(), status = %status, "Applying status");
                apply_or_log(&mut tracked.job, status)
            }
        };

        if state.is_terminal() {
            tracked.release_adapter();
            let job_id = tracked.job.id().to_string();
            match tracked.job.error_info() {
                Some(error) => warn!(job_id = %job_id, state = %state, error = %error, "Job finished"),
                None => info!(job_id = %job_id, state = %state, "Job finished"),
            }
            self.last_stopped = Some(job_id);
        }

        EventDisposition::Applied(state)
    }

    /// Stops the current adapter and drops the job; returns its id
    fn teardown_current(&mut self) -> Option<String> {
        let mut tracked = self.current.take()?;
        tracked.release_adapter();

        let job_id = tracked.job.id().to_string();
        if !tracked.job.is_terminal() {
            debug!(job_id = %job_id, state = %tracked.job.state(), "Superseding job");
        }
        self.last_stopped = Some(job_id.clone());
        Some(job_id)
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }
}

impl Drop for JobLifecycleTracker {
    fn drop(&mut self) {
        self.teardown_current();
    }
}

fn apply_or_log(job: &mut Job, status: NormalizedStatus) -> JobState {
    match job.apply(status) {
        Ok(state) => state,
        Err(e) => {
            debug!(error = %e, "Transition rejected");
            job.state()
        }
    }
}
