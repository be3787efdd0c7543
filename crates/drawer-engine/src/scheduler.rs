//! Debounced single-worker pass scheduler.
//!
//! One Tokio task owns the pass runner. Refresh requests are unit messages
//! on an unbounded channel, so requesting never blocks. The worker cycles
//! `Idle -> Scheduled -> Running -> Idle`:
//!
//! - **Idle**: wait for the first request.
//! - **Scheduled**: every further request pushes the deadline back by the
//!   quiet period; when it elapses, run.
//! - **Running**: the pass runs on Tokio's blocking pool while the worker
//!   awaits it, so passes never overlap and never stall a runtime thread.
//!   Requests arriving now queue in the channel and re-arm the timer
//!   afterwards, so nothing is lost.

use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where the worker is in its cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    /// Waiting for a request.
    Idle,
    /// A pass is due once the quiet period elapses.
    Scheduled,
    /// A pass is executing.
    Running,
    /// The worker has exited.
    Stopped,
}

impl SchedulerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Idle,
            1 => Self::Scheduled,
            2 => Self::Running,
            _ => Self::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Scheduled => 1,
            Self::Running => 2,
            Self::Stopped => 3,
        }
    }
}

/// Worker bookkeeping readable from any thread.
#[derive(Debug, Default)]
struct Shared {
    state: AtomicU8,
    passes: AtomicU64,
}

impl Shared {
    fn set(&self, state: SchedulerState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    fn get(&self) -> SchedulerState {
        SchedulerState::from_u8(self.state.load(Ordering::Acquire))
    }
}

/// Cheap clonable handle for requesting a pass.
#[derive(Clone, Debug)]
pub struct RefreshHandle {
    tx: mpsc::UnboundedSender<()>,
}

impl RefreshHandle {
    /// Ask for a pass. Returns `false` once the worker has stopped.
    pub fn request(&self) -> bool {
        self.tx.send(()).is_ok()
    }
}

/// Owner of the debounce worker. Dropping it stops the worker.
#[derive(Debug)]
pub struct Scheduler {
    handle: RefreshHandle,
    cancel: CancellationToken,
    shared: Arc<Shared>,
    quiet_period: Duration,
}

impl Scheduler {
    /// Spawn the worker on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn spawn<F>(quiet_period: Duration, runner: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::spawn_on(&Handle::current(), quiet_period, runner)
    }

    /// Spawn the worker on `runtime`.
    pub fn spawn_on<F>(runtime: &Handle, quiet_period: Duration, runner: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let shared = Arc::new(Shared::default());

        drop(runtime.spawn(run_worker(
            rx,
            quiet_period,
            Arc::new(runner),
            Arc::clone(&shared),
            cancel.clone(),
        )));

        Self {
            handle: RefreshHandle { tx },
            cancel,
            shared,
            quiet_period,
        }
    }

    /// Ask for a pass after the quiet period.
    pub fn request(&self) -> bool {
        self.handle.request()
    }

    /// A clonable request handle.
    pub fn handle(&self) -> RefreshHandle {
        self.handle.clone()
    }

    /// Current worker state.
    pub fn state(&self) -> SchedulerState {
        self.shared.get()
    }

    /// Passes run so far.
    pub fn passes_completed(&self) -> u64 {
        self.shared.passes.load(Ordering::Acquire)
    }

    /// Configured quiet period.
    pub fn quiet_period(&self) -> Duration {
        self.quiet_period
    }

    /// Stop the worker. A scheduled pass that has not started is dropped.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Whether [`shutdown`](Self::shutdown) was called.
    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_worker<F>(
    mut rx: mpsc::UnboundedReceiver<()>,
    quiet_period: Duration,
    runner: Arc<F>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) where
    F: Fn() + Send + Sync + 'static,
{
    debug!(quiet_ms = quiet_period.as_millis(), "refresh worker started");

    'worker: loop {
        shared.set(SchedulerState::Idle);
        tokio::select! {
            () = cancel.cancelled() => break 'worker,
            request = rx.recv() => if request.is_none() { break 'worker },
        }

        shared.set(SchedulerState::Scheduled);
        let mut closed = false;
        let mut deadline = pin!(sleep(quiet_period));
        loop {
            tokio::select! {
                () = cancel.cancelled() => break 'worker,
                () = &mut deadline => break,
                request = rx.recv() => match request {
                    Some(()) => deadline.as_mut().reset(Instant::now() + quiet_period),
                    None => {
                        closed = true;
                        break;
                    }
                },
            }
        }

        shared.set(SchedulerState::Running);
        let pass = Arc::clone(&runner);
        match tokio::task::spawn_blocking(move || pass()).await {
            Ok(()) => {
                let _ = shared.passes.fetch_add(1, Ordering::AcqRel);
            }
            Err(error) => warn!(%error, "refresh pass panicked"),
        }

        if closed {
            break;
        }
    }

    shared.set(SchedulerState::Stopped);
    info!(passes = shared.passes.load(Ordering::Acquire), "refresh worker stopped");
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    const QUIET: Duration = Duration::from_millis(200);

    fn counting() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (count, move || {
            let _ = c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn burst_coalesces_into_one_pass() {
        let (count, runner) = counting();
        let scheduler = Scheduler::spawn(QUIET, runner);

        for _ in 0..10 {
            assert!(scheduler.request());
            sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.state(), SchedulerState::Scheduled);

        sleep(QUIET + Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.passes_completed(), 1);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn separate_bursts_run_separately() {
        let (count, runner) = counting();
        let scheduler = Scheduler::spawn(QUIET, runner);

        assert!(scheduler.request());
        sleep(QUIET * 2).await;
        assert!(scheduler.handle().request());
        sleep(QUIET * 2).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn request_during_pass_rearms() {
        let slot: Arc<parking_lot::Mutex<Option<RefreshHandle>>> = Arc::default();
        let count = Arc::new(AtomicUsize::new(0));
        let (s, c) = (Arc::clone(&slot), Arc::clone(&count));
        let scheduler = Scheduler::spawn(QUIET, move || {
            // The first pass asks for another one while running.
            if c.fetch_add(1, Ordering::SeqCst) == 0 {
                if let Some(handle) = s.lock().as_ref() {
                    let _ = handle.request();
                }
            }
        });
        *slot.lock() = Some(scheduler.handle());

        assert!(scheduler.request());
        sleep(QUIET + Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        sleep(QUIET + Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_pass_keeps_worker_alive() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let scheduler = Scheduler::spawn(QUIET, move || {
            assert!(c.fetch_add(1, Ordering::SeqCst) > 0, "first pass fails");
        });

        assert!(scheduler.request());
        sleep(QUIET * 2).await;
        assert!(scheduler.request());
        sleep(QUIET * 2).await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.passes_completed(), 1);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_drops_pending_pass() {
        let (count, runner) = counting();
        let scheduler = Scheduler::spawn(QUIET, runner);
        assert!(scheduler.request());
        tokio::task::yield_now().await;

        scheduler.shutdown();
        assert!(scheduler.is_shut_down());
        sleep(QUIET * 2).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert!(!scheduler.request());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_without_requests() {
        let (count, runner) = counting();
        let scheduler = Scheduler::spawn(QUIET, runner);
        sleep(QUIET * 5).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(scheduler.quiet_period(), QUIET);
    }

    #[test]
    fn state_encoding() {
        for s in [
            SchedulerState::Idle,
            SchedulerState::Scheduled,
            SchedulerState::Running,
            SchedulerState::Stopped,
        ] {
            assert_eq!(SchedulerState::from_u8(s.as_u8()), s);
        }
    }
}
