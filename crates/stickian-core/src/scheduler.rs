//! Periodic tick scheduler.
//!
//! A clock task fires every tick period and offers a signal to a bounded
//! [`CatchUpQueue`]. A single worker drains the queue: for each signal it
//! closes the open tick on the [`TickCounter`] and hands that tick to the
//! [`TickHandler`]. Because there is exactly one worker, at most one tick is
//! processed at a time and ticks are processed in increasing order.
//!
//! When processing runs longer than a period, signals accumulate up to the
//! queue capacity; further firings are dropped with a warning and counted in
//! [`SchedulerStats`]. Dropped firings are not replayed, so simulated time
//! slows down rather than bursting after a stall.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use stickian_db::{CityStore, EventStore};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::clock::{ClockError, TickCounter};
use crate::shutdown::ShutdownSignal;
use crate::tick::{TickError, TickProcessor, TickSummary};

/// Something that processes one closed tick.
pub trait TickHandler: Send + Sync {
    /// Process `tick`. Called at most once at a time.
    fn handle_tick(
        &self,
        tick: u64,
    ) -> impl Future<Output = Result<TickSummary, TickError>> + Send;
}

impl<E: EventStore, C: CityStore> TickHandler for TickProcessor<E, C> {
    fn handle_tick(
        &self,
        tick: u64,
    ) -> impl Future<Output = Result<TickSummary, TickError>> + Send {
        std::future::ready(self.process_tick(tick))
    }
}

/// Errors that stop the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The tick counter could not advance.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },
}

/// Observable scheduler counters.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    processed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time copy of [`SchedulerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Ticks whose handler returned successfully.
    pub processed: u64,
    /// Ticks whose handler returned an error.
    pub failed: u64,
    /// Clock firings dropped because the catch-up queue was full.
    pub dropped: u64,
}

impl SchedulerStats {
    /// Read all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_dropped(&self) -> u64 {
        self.dropped.fetch_add(1, Ordering::Relaxed).saturating_add(1)
    }
}

/// Bounded queue of pending clock firings.
#[derive(Debug)]
pub struct CatchUpQueue {
    sender: mpsc::Sender<()>,
    stats: Arc<SchedulerStats>,
}

impl CatchUpQueue {
    /// Create a queue holding up to `capacity` firings (at least one).
    pub fn new(capacity: usize, stats: Arc<SchedulerStats>) -> (Self, mpsc::Receiver<()>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender, stats }, receiver)
    }

    /// Offer one firing. Returns `false` once the worker has gone away.
    pub fn offer(&self) -> bool {
        match self.sender.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) => {
                let dropped = self.stats.record_dropped();
                warn!(dropped, "Tick processing is behind, clock firing dropped");
                true
            }
            Err(TrySendError::Closed(())) => false,
        }
    }
}

/// Final state of a scheduler run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerReport {
    /// Counters at shutdown.
    pub stats: StatsSnapshot,
    /// Last tick handed to the handler, if any.
    pub last_tick: Option<u64>,
}

/// Drives a [`TickHandler`] from a periodic clock.
#[derive(Debug)]
pub struct TickScheduler {
    counter: Arc<TickCounter>,
    period: Duration,
    catch_up_capacity: usize,
    stats: Arc<SchedulerStats>,
}

impl TickScheduler {
    /// Create a scheduler advancing `counter` once per `period`.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidPeriod`] if `period` is zero.
    pub fn new(
        counter: Arc<TickCounter>,
        period: Duration,
        catch_up_capacity: usize,
    ) -> Result<Self, ClockError> {
        if period.is_zero() {
            return Err(ClockError::InvalidPeriod {
                reason: "tick period must be greater than zero".to_owned(),
            });
        }
        Ok(Self {
            counter,
            period,
            catch_up_capacity: catch_up_capacity.max(1),
            stats: Arc::new(SchedulerStats::default()),
        })
    }

    /// Shared handle to the live counters.
    pub fn stats(&self) -> Arc<SchedulerStats> {
        Arc::clone(&self.stats)
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// A tick already handed to `handler` always runs to completion before
    /// the loop observes shutdown. Handler errors are logged and counted;
    /// the loop continues with the next tick.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Clock`] if the tick counter cannot advance.
    pub async fn run<H: TickHandler>(
        &self,
        handler: &H,
        shutdown: &ShutdownSignal,
    ) -> Result<SchedulerReport, SchedulerError> {
        let (queue, mut signals) = CatchUpQueue::new(self.catch_up_capacity, self.stats());
        let period = self.period;
        let clock = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                if !queue.offer() {
                    break;
                }
            }
        });

        info!(
            period = ?period,
            catch_up_capacity = self.catch_up_capacity,
            "Tick scheduler started"
        );

        let mut last_tick = None;
        let outcome = loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break Ok(()),
                signal = signals.recv() => {
                    if signal.is_none() {
                        break Ok(());
                    }
                    let tick = match self.counter.advance() {
                        Ok(tick) => tick,
                        Err(err) => break Err(err),
                    };
                    last_tick = Some(tick);
                    match handler.handle_tick(tick).await {
                        Ok(summary) => {
                            self.stats.record_processed();
                            debug!(tick, settled = summary.settled, "Tick handled");
                        }
                        Err(err) => {
                            self.stats.record_failed();
                            warn!(tick, error = %err, "Tick failed, events stay pending");
                        }
                    }
                }
            }
        };
        clock.abort();
        outcome?;

        let report = SchedulerReport {
            stats: self.stats.snapshot(),
            last_tick,
        };
        info!(
            last_tick = ?report.last_tick,
            processed = report.stats.processed,
            failed = report.stats.failed,
            dropped = report.stats.dropped,
            "Tick scheduler stopped"
        );
        Ok(report)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::AtomicBool;

    use stickian_db::DbError;

    use super::*;

    const PERIOD: Duration = Duration::from_millis(10);

    /// Records ticks, optionally sleeping or failing, and stops the run
    /// after `stop_after` ticks.
    struct Recorder {
        seen: Mutex<Vec<u64>>,
        busy: AtomicBool,
        overlapped: AtomicBool,
        work: Duration,
        fail_on: Option<u64>,
        stop_after: usize,
        shutdown: Arc<ShutdownSignal>,
    }

    impl Recorder {
        fn new(work: Duration, stop_after: usize, shutdown: Arc<ShutdownSignal>) -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                busy: AtomicBool::new(false),
                overlapped: AtomicBool::new(false),
                work,
                fail_on: None,
                stop_after,
                shutdown,
            }
        }

        fn seen(&self) -> Vec<u64> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl TickHandler for Recorder {
        fn handle_tick(
            &self,
            tick: u64,
        ) -> impl Future<Output = Result<TickSummary, TickError>> + Send {
            async move {
                if self.busy.swap(true, Ordering::SeqCst) {
                    self.overlapped.store(true, Ordering::SeqCst);
                }
                if !self.work.is_zero() {
                    tokio::time::sleep(self.work).await;
                }
                let count = {
                    let mut seen = self.seen.lock().unwrap();
                    seen.push(tick);
                    seen.len()
                };
                self.busy.store(false, Ordering::SeqCst);
                if count >= self.stop_after {
                    self.shutdown.cancel();
                }
                if self.fail_on == Some(tick) {
                    return Err(TickError::ReadEvents {
                        tick,
                        source: DbError::Unavailable("test".to_owned()),
                    });
                }
                Ok(TickSummary {
                    tick,
                    settled: true,
                    ..TickSummary::default()
                })
            }
        }
    }

    fn scheduler(counter: &Arc<TickCounter>) -> TickScheduler {
        TickScheduler::new(Arc::clone(counter), PERIOD, 1).unwrap()
    }

    #[test]
    fn zero_period_is_rejected() {
        let result = TickScheduler::new(Arc::new(TickCounter::new()), Duration::ZERO, 1);
        assert!(matches!(result, Err(ClockError::InvalidPeriod { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_are_processed_in_order() {
        let counter = Arc::new(TickCounter::new());
        let shutdown = Arc::new(ShutdownSignal::new());
        let handler = Recorder::new(Duration::ZERO, 5, Arc::clone(&shutdown));

        let report = scheduler(&counter).run(&handler, &shutdown).await.unwrap();

        assert_eq!(handler.seen(), vec![0, 1, 2, 3, 4]);
        assert_eq!(report.last_tick, Some(4));
        assert_eq!(report.stats.processed, 5);
        assert_eq!(counter.current().unwrap(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_ticks_drop_firings_without_overlap() {
        let counter = Arc::new(TickCounter::new());
        let shutdown = Arc::new(ShutdownSignal::new());
        let handler = Recorder::new(Duration::from_millis(30), 4, Arc::clone(&shutdown));
        let scheduler = scheduler(&counter);

        let report = scheduler.run(&handler, &shutdown).await.unwrap();

        assert_eq!(handler.seen(), vec![0, 1, 2, 3]);
        assert!(!handler.overlapped.load(Ordering::SeqCst));
        assert!(report.stats.dropped >= 1);
        assert_eq!(scheduler.stats().snapshot(), report.stats);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_tick_does_not_stop_the_loop() {
        let counter = Arc::new(TickCounter::new());
        let shutdown = Arc::new(ShutdownSignal::new());
        let mut handler = Recorder::new(Duration::ZERO, 3, Arc::clone(&shutdown));
        handler.fail_on = Some(1);

        let report = scheduler(&counter).run(&handler, &shutdown).await.unwrap();

        assert_eq!(handler.seen(), vec![0, 1, 2]);
        assert_eq!(report.stats.processed, 2);
        assert_eq!(report.stats.failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_start_processes_nothing() {
        let counter = Arc::new(TickCounter::new());
        let shutdown = Arc::new(ShutdownSignal::new());
        shutdown.cancel();
        let handler = Recorder::new(Duration::ZERO, 1, Arc::clone(&shutdown));

        let report = scheduler(&counter).run(&handler, &shutdown).await.unwrap();

        assert_eq!(report.last_tick, None);
        assert!(handler.seen().is_empty());
        assert_eq!(counter.current().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn counter_overflow_stops_the_scheduler() {
        let counter = Arc::new(TickCounter::starting_at(u64::MAX));
        let shutdown = Arc::new(ShutdownSignal::new());
        let handler = Recorder::new(Duration::ZERO, 1, Arc::clone(&shutdown));

        let result = scheduler(&counter).run(&handler, &shutdown).await;

        assert!(matches!(
            result,
            Err(SchedulerError::Clock {
                source: ClockError::TickOverflow
            })
        ));
    }

    #[test]
    fn full_queue_counts_drops() {
        let stats = Arc::new(SchedulerStats::default());
        let (queue, receiver) = CatchUpQueue::new(1, Arc::clone(&stats));
        assert!(queue.offer());
        assert!(queue.offer());
        assert!(queue.offer());
        assert_eq!(stats.snapshot().dropped, 2);
        drop(receiver);
        assert!(!queue.offer());
    }
}
