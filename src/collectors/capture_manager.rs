//! Capture lifecycle: at most one capture session per process.
//!
//! The packet source blocks inside its receive primitive, so each session runs on
//! a dedicated OS thread. Cancellation is cooperative: `stop` raises the session's
//! [`StopSignal`], which the loop checks after every poll window and packet, then
//! waits a bounded time for the thread to report back.
//!
//! Locking: `control` serializes start/stop requests and is always taken before
//! `session`; the capture thread never touches either. `session` guards only short
//! state updates and is never held across an await.

use chrono::{DateTime, Local};
use log::{debug, error, info, trace, warn};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::time::timeout;

use crate::collectors::extractor::{self, Extraction};
use crate::collectors::packet_source::{PacketSource, PacketSourceFactory, SourceEvent};
use crate::collectors::pipeline::EntryPipeline;
use crate::error::{MonitorError, Result, SourceError};

const MAX_RESTART_DELAY: Duration = Duration::from_secs(60);
const STOP_POLL_SLICE: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    Idle,
    Running,
    Stopping,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureStatus {
    pub state: CaptureState,
    /// Whether a capture thread is currently alive
    pub alive: bool,
    /// Last interface a session was started on
    pub interface: Option<String>,
    pub started_at: Option<DateTime<Local>>,
}

impl CaptureStatus {
    pub fn is_running(&self) -> bool {
        self.state == CaptureState::Running
    }
}

/// Cooperative cancellation flag owned by a single capture session.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleeps for `duration` in short slices; returns `true` as soon as the
    /// signal is raised.
    pub fn sleep_unless_raised(&self, duration: Duration) -> bool {
        let mut slept = Duration::ZERO;
        while slept < duration {
            if self.is_raised() {
                return true;
            }
            let slice = STOP_POLL_SLICE.min(duration - slept);
            thread::sleep(slice);
            slept += slice;
        }
        self.is_raised()
    }
}

/// Bounded re-open policy after an unexpected source failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl RestartPolicy {
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: Duration::ZERO,
        }
    }

    /// Exponential backoff: `initial_delay * 2^(attempt - 1)`, capped at one minute.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay.saturating_mul(factor).min(MAX_RESTART_DELAY)
    }
}

/// Why a capture loop finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    Stopped,
    SourceClosed,
    Failed(String),
}

impl fmt::Display for LoopExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopExit::Stopped => f.write_str("stopped on request"),
            LoopExit::SourceClosed => f.write_str("packet source closed"),
            LoopExit::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// Nothing was running
    AlreadyIdle,
    Stopped(LoopExit),
    /// The loop did not report back within the stop timeout
    TimedOut,
}

struct RunHandle {
    stop: StopSignal,
    alive: Arc<AtomicBool>,
    done: oneshot::Receiver<LoopExit>,
}

impl RunHandle {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

struct SessionSlot {
    state: CaptureState,
    interface: Option<String>,
    started_at: Option<DateTime<Local>>,
    run: Option<RunHandle>,
}

pub struct CaptureManager {
    factory: Arc<dyn PacketSourceFactory>,
    pipeline: Arc<EntryPipeline>,
    control: AsyncMutex<()>,
    session: Mutex<SessionSlot>,
    stop_timeout: Duration,
    restart: RestartPolicy,
}

impl CaptureManager {
    pub fn new(
        factory: Arc<dyn PacketSourceFactory>,
        pipeline: Arc<EntryPipeline>,
        stop_timeout: Duration,
        restart: RestartPolicy,
    ) -> Self {
        Self {
            factory,
            pipeline,
            control: AsyncMutex::new(()),
            session: Mutex::new(SessionSlot {
                state: CaptureState::Idle,
                interface: None,
                started_at: None,
                run: None,
            }),
            stop_timeout,
            restart,
        }
    }

    fn lock_session(&self) -> MutexGuard<'_, SessionSlot> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn interfaces(&self) -> Vec<String> {
        self.factory.interfaces()
    }

    /// Starts capturing on `interface`, stopping any active session first.
    ///
    /// Open failures happen on the capture thread and only show up in
    /// [`status`](Self::status).
    pub async fn start(&self, interface: &str) -> Result<CaptureStatus> {
        let interface = interface.trim();
        if interface.is_empty() {
            return Err(MonitorError::InvalidArgument(
                "no interface selected".to_string(),
            ));
        }

        let _control = self.control.lock().await;

        if self.lock_session().run.is_some() {
            info!("Capture already active, restarting it on {interface}");
            self.stop_active().await;
        }

        let stop = StopSignal::new();
        let alive = Arc::new(AtomicBool::new(true));
        let (done_tx, done_rx) = oneshot::channel();
        let capture = CaptureLoop {
            interface: interface.to_string(),
            factory: Arc::clone(&self.factory),
            pipeline: Arc::clone(&self.pipeline),
            stop: stop.clone(),
            alive: Arc::clone(&alive),
            restart: self.restart,
        };

        thread::Builder::new()
            .name(format!("dns-capture-{interface}"))
            .spawn(move || {
                let exit = capture.run();
                let _ = done_tx.send(exit);
            })
            .map_err(|e| MonitorError::SourceUnavailable {
                interface: interface.to_string(),
                source: SourceError::Open(e),
            })?;

        {
            let mut slot = self.lock_session();
            slot.state = CaptureState::Running;
            slot.interface = Some(interface.to_string());
            slot.started_at = Some(Local::now());
            slot.run = Some(RunHandle {
                stop,
                alive,
                done: done_rx,
            });
        }

        info!("Started capture on interface: {interface}");
        Ok(self.status())
    }

    /// Stops the active session, waiting at most the configured stop timeout.
    ///
    /// Safe to call concurrently and when idle; only one caller performs the
    /// signal and wait, the others see [`StopOutcome::AlreadyIdle`].
    pub async fn stop(&self) -> StopOutcome {
        let _control = self.control.lock().await;
        self.stop_active().await
    }

    async fn stop_active(&self) -> StopOutcome {
        let (run, interface) = {
            let mut slot = self.lock_session();
            let Some(run) = slot.run.take() else {
                return StopOutcome::AlreadyIdle;
            };
            slot.state = CaptureState::Stopping;
            (run, slot.interface.clone().unwrap_or_default())
        };

        info!("Stopping capture on {interface}...");
        run.stop.raise();

        let outcome = match timeout(self.stop_timeout, run.done).await {
            Ok(Ok(exit)) => {
                info!("Capture thread on {interface} terminated: {exit}");
                StopOutcome::Stopped(exit)
            }
            Ok(Err(_)) => {
                warn!("Capture thread on {interface} exited without reporting");
                StopOutcome::Stopped(LoopExit::Failed("capture thread panicked".to_string()))
            }
            Err(_) => {
                let err = MonitorError::CancellationTimeout {
                    interface,
                    timeout: self.stop_timeout,
                };
                warn!("{err}; it will exit at its next stop check");
                StopOutcome::TimedOut
            }
        };

        self.lock_session().state = CaptureState::Idle;
        outcome
    }

    pub fn status(&self) -> CaptureStatus {
        let slot = self.lock_session();
        let alive = slot.run.as_ref().is_some_and(RunHandle::is_alive);
        let state = match slot.state {
            CaptureState::Running if !alive => CaptureState::Idle,
            state => state,
        };

        CaptureStatus {
            state,
            alive,
            interface: slot.interface.clone(),
            started_at: slot.started_at,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status().is_running()
    }
}

/// Clears the session's alive flag when the capture thread finishes, even on panic.
struct AliveGuard(Arc<AtomicBool>);

impl Drop for AliveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct CaptureLoop {
    interface: String,
    factory: Arc<dyn PacketSourceFactory>,
    pipeline: Arc<EntryPipeline>,
    stop: StopSignal,
    alive: Arc<AtomicBool>,
    restart: RestartPolicy,
}

impl CaptureLoop {
    fn run(self) -> LoopExit {
        let _alive = AliveGuard(Arc::clone(&self.alive));
        let mut attempts = 0;

        loop {
            info!("Starting capture on interface: {}", self.interface);
            let failure = match self.factory.open(&self.interface) {
                Ok(source) => match self.consume(source) {
                    Ok(exit) => {
                        info!("Capture stopped on {}: {exit}", self.interface);
                        return exit;
                    }
                    Err(e) => e,
                },
                Err(e) => e,
            };

            let err = MonitorError::SourceUnavailable {
                interface: self.interface.clone(),
                source: failure,
            };
            error!("Error in capture loop: {err}");

            if self.stop.is_raised() {
                return LoopExit::Stopped;
            }
            if attempts >= self.restart.max_attempts {
                return LoopExit::Failed(err.to_string());
            }

            attempts += 1;
            let delay = self.restart.delay_for(attempts);
            warn!(
                "Restarting capture on {} in {delay:?} (attempt {attempts}/{})",
                self.interface, self.restart.max_attempts
            );
            if self.stop.sleep_unless_raised(delay) {
                return LoopExit::Stopped;
            }
        }
    }

    fn consume(&self, mut source: Box<dyn PacketSource>) -> std::result::Result<LoopExit, SourceError> {
        let mut accepted = 0u64;
        let mut rejected = 0u64;

        loop {
            if self.stop.is_raised() {
                debug!(
                    "Stop requested on {} after {accepted} accepted / {rejected} rejected packets",
                    self.interface
                );
                return Ok(LoopExit::Stopped);
            }

            match source.next_event()? {
                SourceEvent::Packet(packet) => {
                    if self.stop.is_raised() {
                        continue;
                    }
                    match extractor::extract(&packet) {
                        Extraction::Accepted(observation) => {
                            self.pipeline.ingest(observation);
                            accepted += 1;
                        }
                        Extraction::Rejected(reason) => {
                            trace!("Skipping packet: {reason}");
                            rejected += 1;
                        }
                    }
                }
                SourceEvent::Idle => {}
                SourceEvent::Closed => return Ok(LoopExit::SourceClosed),
            }
        }
    }
}
