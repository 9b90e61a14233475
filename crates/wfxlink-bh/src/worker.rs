//! Bottom-half worker.
//!
//! The worker owns the [`Link`] and runs [`Link::run`] whenever it is
//! signaled. Requests arriving while a run is in progress collapse into a
//! single follow-up run; runs never overlap.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{BhError, Result};
use crate::link::{Link, LinkShared};
use crate::stats::BhStats;

/// Poll interval of flush loops.
const FLUSH_POLL: Duration = Duration::from_millis(5);

#[derive(Debug, Default)]
struct SignalState {
    pending: bool,
    closed: bool,
}

/// Single-slot, coalescing work notification.
#[derive(Debug, Default)]
pub(crate) struct WorkSignal {
    state: Mutex<SignalState>,
    cv: Condvar,
    #[cfg(feature = "async")]
    notify: tokio::sync::Notify,
}

impl WorkSignal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SignalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Request a run. Returns false once the signal is closed.
    pub(crate) fn raise(&self) -> bool {
        {
            let mut state = self.lock();
            if state.closed {
                return false;
            }
            state.pending = true;
        }
        self.cv.notify_one();
        #[cfg(feature = "async")]
        self.notify.notify_one();
        true
    }

    /// Consume a pending request.
    pub(crate) fn take(&self) -> bool {
        std::mem::replace(&mut self.lock().pending, false)
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.lock().pending
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Stop accepting requests. Already pending work still runs.
    pub(crate) fn close(&self) {
        self.lock().closed = true;
        self.cv.notify_all();
        #[cfg(feature = "async")]
        self.notify.notify_one();
    }

    /// Block until a request is pending (consuming it) or the signal closes.
    fn wait(&self) -> bool {
        let mut state = self.lock();
        loop {
            if state.pending {
                state.pending = false;
                return true;
            }
            if state.closed {
                return false;
            }
            state = self.cv.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    #[cfg(feature = "async")]
    async fn notified(&self) {
        self.notify.notified().await;
    }
}

/// Cloneable entry points for interrupt and transmit sources.
#[derive(Clone)]
pub struct LinkTrigger {
    shared: Arc<LinkShared>,
}

impl LinkTrigger {
    /// The chip raised its interrupt line.
    pub fn request_receive(&self) -> Result<()> {
        self.shared.request_receive()
    }

    /// New messages are waiting in the outbound queue.
    pub fn request_transmit(&self) -> Result<()> {
        self.shared.request_transmit()
    }
}

impl std::fmt::Debug for LinkTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkTrigger").finish_non_exhaustive()
    }
}

/// Handle to a link running on a worker thread.
///
/// Dropping the handle stops the worker after any pending run.
pub struct LinkHandle {
    shared: Arc<LinkShared>,
    flush_timeout: Duration,
    worker: Option<JoinHandle<BhStats>>,
}

impl Link {
    /// Move the link onto a dedicated worker thread.
    pub fn spawn(self) -> Result<LinkHandle> {
        let shared = Arc::clone(&self.shared);
        let flush_timeout = self.config().flush_timeout;
        let worker = thread::Builder::new()
            .name("wfxlink-bh".to_string())
            .spawn(move || worker_loop(self))
            .map_err(BhError::Spawn)?;
        debug!("bottom-half worker started");
        Ok(LinkHandle {
            shared,
            flush_timeout,
            worker: Some(worker),
        })
    }
}

fn worker_loop(mut link: Link) -> BhStats {
    let shared = Arc::clone(&link.shared);
    while shared.signal.wait() {
        link.run();
    }
    debug!("bottom-half worker stopped");
    link.into_stats()
}

impl LinkHandle {
    /// Entry points to hand to interrupt and transmit sources.
    pub fn trigger(&self) -> LinkTrigger {
        LinkTrigger {
            shared: Arc::clone(&self.shared),
        }
    }

    /// The chip raised its interrupt line.
    pub fn request_receive(&self) -> Result<()> {
        self.shared.request_receive()
    }

    /// New messages are waiting in the outbound queue.
    pub fn request_transmit(&self) -> Result<()> {
        self.shared.request_transmit()
    }

    /// Mark a scan as running. The chip is kept awake until it is cleared.
    pub fn set_scan_in_progress(&self, in_progress: bool) {
        self.shared
            .scan_in_progress
            .store(in_progress, Ordering::Release);
    }

    /// Credits currently held by the chip.
    pub fn credits_used(&self) -> u32 {
        self.shared.credits.used()
    }

    /// Block until the outbound queue is empty and every credit is back,
    /// bounded by the configured flush timeout.
    pub fn flush(&self) -> Result<()> {
        self.flush_with_timeout(self.flush_timeout)
    }

    /// Like [`flush`](Self::flush) with an explicit bound.
    pub fn flush_with_timeout(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.shared.is_drained() {
                return Ok(());
            }
            self.shared.request_transmit()?;
            let now = Instant::now();
            if now >= deadline {
                return Err(BhError::Timeout(timeout));
            }
            let slice = (deadline - now).min(FLUSH_POLL);
            if self.shared.credits.used() == 0 {
                thread::sleep(slice);
            } else {
                self.shared.credits.wait_drained(slice);
            }
        }
    }

    /// Drop every queued message, then wait for the credits already in
    /// flight like [`flush`](Self::flush).
    ///
    /// Returns the number of messages dropped.
    pub fn flush_discarding(&self) -> Result<usize> {
        let dropped = self.shared.queue.clear();
        if dropped > 0 {
            debug!(dropped, "outbound queue discarded");
        }
        self.flush()?;
        Ok(dropped)
    }

    /// Stop accepting work, let the worker finish pending runs and collect
    /// its statistics.
    pub fn teardown(mut self) -> Result<BhStats> {
        self.shared.signal.close();
        let worker = self.worker.take().ok_or(BhError::Shutdown)?;
        worker.join().map_err(|_| BhError::WorkerPanicked)
    }
}

impl Drop for LinkHandle {
    fn drop(&mut self) {
        self.shared.signal.close();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl std::fmt::Debug for LinkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkHandle")
            .field("credits_used", &self.credits_used())
            .field("running", &self.worker.is_some())
            .finish()
    }
}

/// Handle to a link running as a tokio task.
///
/// Each bottom-half pass runs on the blocking pool.
#[cfg(feature = "async")]
pub struct AsyncLinkHandle {
    shared: Arc<LinkShared>,
    flush_timeout: Duration,
    task: Option<tokio::task::JoinHandle<Result<BhStats>>>,
}

#[cfg(feature = "async")]
impl Link {
    /// Move the link onto a tokio task. Must be called inside a runtime.
    pub fn spawn_async(self) -> AsyncLinkHandle {
        let shared = Arc::clone(&self.shared);
        let flush_timeout = self.config().flush_timeout;
        let task = tokio::spawn(async_worker_loop(self));
        debug!("bottom-half task started");
        AsyncLinkHandle {
            shared,
            flush_timeout,
            task: Some(task),
        }
    }
}

#[cfg(feature = "async")]
async fn async_worker_loop(mut link: Link) -> Result<BhStats> {
    let shared = Arc::clone(&link.shared);
    loop {
        if !shared.signal.take() {
            if shared.signal.is_closed() {
                break;
            }
            shared.signal.notified().await;
            continue;
        }
        link = tokio::task::spawn_blocking(move || {
            link.run();
            link
        })
        .await
        .map_err(|_| BhError::WorkerPanicked)?;
    }
    debug!("bottom-half task stopped");
    Ok(link.into_stats())
}

#[cfg(feature = "async")]
impl AsyncLinkHandle {
    pub fn trigger(&self) -> LinkTrigger {
        LinkTrigger {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn request_receive(&self) -> Result<()> {
        self.shared.request_receive()
    }

    pub fn request_transmit(&self) -> Result<()> {
        self.shared.request_transmit()
    }

    pub fn set_scan_in_progress(&self, in_progress: bool) {
        self.shared
            .scan_in_progress
            .store(in_progress, Ordering::Release);
    }

    pub fn credits_used(&self) -> u32 {
        self.shared.credits.used()
    }

    /// Wait until the outbound queue is empty and every credit is back.
    pub async fn flush(&self) -> Result<()> {
        self.flush_with_timeout(self.flush_timeout).await
    }

    pub async fn flush_with_timeout(&self, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.shared.is_drained() {
                return Ok(());
            }
            self.shared.request_transmit()?;
            if tokio::time::Instant::now() >= deadline {
                return Err(BhError::Timeout(timeout));
            }
            tokio::time::sleep(FLUSH_POLL).await;
        }
    }

    /// Drop every queued message, then wait for in-flight credits.
    pub async fn flush_discarding(&self) -> Result<usize> {
        let dropped = self.shared.queue.clear();
        if dropped > 0 {
            debug!(dropped, "outbound queue discarded");
        }
        self.flush().await?;
        Ok(dropped)
    }

    /// Stop accepting work and wait for the task to drain.
    pub async fn teardown(mut self) -> Result<BhStats> {
        self.shared.signal.close();
        let task = self.task.take().ok_or(BhError::Shutdown)?;
        task.await.map_err(|_| BhError::WorkerPanicked)?
    }
}

#[cfg(feature = "async")]
impl Drop for AsyncLinkHandle {
    fn drop(&mut self) {
        self.shared.signal.close();
    }
}
