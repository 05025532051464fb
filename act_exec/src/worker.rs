//! # Command Worker
//!
//! Each actuator component owns exactly one [`Worker`]: a dedicated thread which drains a private
//! FIFO queue of requests and hands them, one at a time, to a [`Consumer`]. The consumer owns the
//! component's hardware, so the hardware is only ever touched from the worker thread.
//!
//! Producers on any thread may [`Worker::submit`] requests concurrently. Submission never blocks:
//! an unbounded worker always accepts, a bounded worker fails fast with [`ActError::QueueFull`].
//!
//! Shutdown is cooperative. [`Worker::shutdown`] stops processing of queued requests, discards
//! anything still waiting in the queue, wakes the thread with a stop sentinel and joins it. A
//! request which is already being consumed is always allowed to finish. The consumer is then
//! returned to the caller so the hardware can be released.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    fmt::{Debug, Display},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, trace, warn};

use crate::error::ActError;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Default time the worker waits for a new request before re-checking the stop flag.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Interval at which [`Worker::wait_idle`] re-checks the number of pending requests.
const IDLE_CHECK_INTERVAL: Duration = Duration::from_millis(1);

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// The hardware-specific half of a worker, executed on the worker thread.
pub trait Consumer: Send + 'static {
    /// The request type accepted by the worker.
    type Request: Debug + Send + 'static;

    /// Error produced when a request fails. Failures are logged and the worker carries on.
    type Error: Display;

    /// Execute a single request.
    fn consume(&mut self, request: Self::Request) -> Result<(), Self::Error>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Configuration of a [`Worker`].
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Name of the worker thread, also used in log messages.
    pub name: String,

    /// Maximum number of queued requests, or `None` for an unbounded queue.
    pub capacity: Option<usize>,

    /// How long the thread blocks waiting for a request before checking the stop flag.
    pub poll_timeout: Duration,

    /// Delay applied after every loop iteration, giving the worker a fixed cadence.
    pub pacing: Duration,
}

/// A single-consumer command queue with its dedicated thread.
pub struct Worker<C: Consumer> {
    name: String,
    capacity: Option<usize>,
    tx: Sender<Envelope<C::Request>>,
    rx: Receiver<Envelope<C::Request>>,
    stop: Arc<AtomicBool>,
    in_flight: Arc<AtomicUsize>,
    handle: Option<JoinHandle<C>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Items carried by the worker's channel.
#[derive(Debug)]
enum Envelope<R> {
    Request(R),
    Stop,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl WorkerConfig {
    /// Configuration for a worker with an unbounded queue.
    pub fn unbounded(name: &str) -> Self {
        Self {
            name: name.to_string(),
            capacity: None,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            pacing: Duration::ZERO,
        }
    }

    /// Configuration for a worker with a queue holding at most `capacity` requests.
    pub fn bounded(name: &str, capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::unbounded(name)
        }
    }

    /// Set the poll timeout.
    pub fn poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    /// Set the pacing delay.
    pub fn pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }
}

impl<C: Consumer> Worker<C> {
    /// Spawn the worker thread, moving `consumer` onto it.
    pub fn spawn(config: WorkerConfig, consumer: C) -> Result<Self, ActError> {
        let (tx, rx) = match config.capacity {
            // A zero capacity crossbeam channel is a rendezvous channel, which would make every
            // `try_send` fail while the consumer is busy. Treat it as a capacity of one instead.
            Some(cap) => channel::bounded(cap.max(1)),
            None => channel::unbounded(),
        };

        let stop = Arc::new(AtomicBool::new(false));
        let in_flight = Arc::new(AtomicUsize::new(0));

        let thread_rx = rx.clone();
        let thread_stop = stop.clone();
        let thread_in_flight = in_flight.clone();
        let thread_config = config.clone();

        let handle = thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || {
                run(consumer, thread_config, thread_rx, thread_stop, thread_in_flight)
            })
            .map_err(|source| ActError::WorkerSpawn {
                name: config.name.clone(),
                source,
            })?;

        debug!("{} worker spawned (capacity: {:?})", config.name, config.capacity);

        Ok(Self {
            name: config.name,
            capacity: config.capacity,
            tx,
            rx,
            stop,
            in_flight,
            handle: Some(handle),
        })
    }

    /// Queue a request for the worker. Never blocks.
    pub fn submit(&self, request: C::Request) -> Result<(), ActError> {
        if self.stop.load(Ordering::Acquire) {
            return Err(ActError::WorkerStopped(self.name.clone()));
        }

        trace!("{}: queueing {:?}", self.name, request);

        self.in_flight.fetch_add(1, Ordering::AcqRel);

        match self.tx.try_send(Envelope::Request(request)) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.in_flight.fetch_sub(1, Ordering::AcqRel);
                match e {
                    TrySendError::Full(_) => Err(ActError::QueueFull(self.capacity.unwrap_or(0))),
                    TrySendError::Disconnected(_) => Err(ActError::WorkerStopped(self.name.clone())),
                }
            }
        }
    }

    /// Number of requests which have been submitted but not yet consumed or discarded.
    pub fn pending(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Block until every submitted request has been consumed, or the timeout expires.
    ///
    /// Returns `true` if the worker became idle within the timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let start = Instant::now();

        while self.pending() > 0 {
            if start.elapsed() >= timeout {
                return false;
            }
            thread::sleep(IDLE_CHECK_INTERVAL);
        }

        true
    }

    /// Stop the worker, discarding any queued requests, and return the consumer.
    pub fn shutdown(mut self) -> Result<C, ActError> {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> Result<C, ActError> {
        let handle = self.handle
            .take()
            .ok_or_else(|| ActError::WorkerStopped(self.name.clone()))?;

        self.stop.store(true, Ordering::Release);

        // Discard everything still waiting in the queue
        let discarded = self.rx
            .try_iter()
            .filter(|e| matches!(e, Envelope::Request(_)))
            .count();
        if discarded > 0 {
            self.in_flight.fetch_sub(discarded, Ordering::AcqRel);
            warn!("{}: discarded {} pending request(s) on shutdown", self.name, discarded);
        }

        // Wake the thread if it is blocked waiting for a request. If the queue has been refilled
        // by a racing producer the thread still sees the stop flag on its next iteration.
        let _ = self.tx.try_send(Envelope::Stop);

        let consumer = handle
            .join()
            .map_err(|_| ActError::WorkerPanicked(self.name.clone()))?;

        debug!("{} worker joined", self.name);

        Ok(consumer)
    }
}

impl<C: Consumer> Drop for Worker<C> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            if let Err(e) = self.stop_and_join() {
                warn!("{}: error while stopping worker: {}", self.name, e);
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// The worker thread's main loop.
fn run<C: Consumer>(
    mut consumer: C,
    config: WorkerConfig,
    rx: Receiver<Envelope<C::Request>>,
    stop: Arc<AtomicBool>,
    in_flight: Arc<AtomicUsize>,
) -> C {
    while !stop.load(Ordering::Acquire) {
        match rx.recv_timeout(config.poll_timeout) {
            Ok(Envelope::Request(request)) => {
                if stop.load(Ordering::Acquire) {
                    trace!("{}: discarding {:?}, shutting down", config.name, request);
                }
                else if let Err(e) = consumer.consume(request) {
                    warn!("{}: request failed: {}", config.name, e);
                }
                in_flight.fetch_sub(1, Ordering::AcqRel);
            },
            Ok(Envelope::Stop) => break,
            Err(RecvTimeoutError::Timeout) => (),
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if !config.pacing.is_zero() {
            thread::sleep(config.pacing);
        }
    }

    trace!("{}: worker loop exited", config.name);

    consumer
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every request it consumes, failing on negative values.
    struct Recorder {
        seen: Arc<Mutex<Vec<i32>>>,
        delay: Duration,
    }

    impl Consumer for Recorder {
        type Request = i32;
        type Error = String;

        fn consume(&mut self, request: i32) -> Result<(), String> {
            thread::sleep(self.delay);
            if request < 0 {
                return Err(format!("negative request {}", request));
            }
            self.seen.lock().unwrap().push(request);
            Ok(())
        }
    }

    fn recorder(delay: Duration) -> (Recorder, Arc<Mutex<Vec<i32>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        (Recorder { seen: seen.clone(), delay }, seen)
    }

    #[test]
    fn test_fifo_across_producers() {
        let (rec, seen) = recorder(Duration::ZERO);
        let worker = Arc::new(Worker::spawn(WorkerConfig::unbounded("fifo"), rec).unwrap());

        // Each producer submits an increasing sequence, so per-producer order must be kept
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let w = worker.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        w.submit(p * 1000 + i).unwrap();
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }

        assert!(worker.wait_idle(Duration::from_secs(5)));

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 200);
        for p in 0..4 {
            let mine: Vec<i32> = seen.iter().copied().filter(|v| v / 1000 == p).collect();
            let expected: Vec<i32> = (0..50).map(|i| p * 1000 + i).collect();
            assert_eq!(mine, expected);
        }

        match Arc::try_unwrap(worker) {
            Ok(w) => { w.shutdown().unwrap(); },
            Err(_) => panic!("worker still shared"),
        }
    }

    #[test]
    fn test_failed_request_does_not_stop_worker() {
        let (rec, seen) = recorder(Duration::ZERO);
        let worker = Worker::spawn(WorkerConfig::unbounded("errors"), rec).unwrap();

        worker.submit(1).unwrap();
        worker.submit(-1).unwrap();
        worker.submit(2).unwrap();
        assert!(worker.wait_idle(Duration::from_secs(1)));

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
        worker.shutdown().unwrap();
    }

    #[test]
    fn test_bounded_queue_fails_fast() {
        let (rec, _seen) = recorder(Duration::from_millis(200));
        let worker = Worker::spawn(WorkerConfig::bounded("bounded", 3), rec).unwrap();

        let start = Instant::now();
        let mut accepted = 0;
        let err = loop {
            match worker.submit(accepted) {
                Ok(()) => accepted += 1,
                Err(e) => break e,
            }
            assert!(accepted <= 10, "bounded queue never filled");
        };

        assert!(matches!(err, ActError::QueueFull(3)));
        // One request may already be with the consumer
        assert!(accepted == 3 || accepted == 4);
        assert!(start.elapsed() < Duration::from_millis(100));

        worker.shutdown().unwrap();
    }

    #[test]
    fn test_shutdown_discards_pending() {
        let (rec, seen) = recorder(Duration::from_millis(50));
        let worker = Worker::spawn(WorkerConfig::unbounded("discard"), rec).unwrap();

        for i in 0..20 {
            worker.submit(i).unwrap();
        }

        let rec = worker.shutdown().unwrap();

        // At most the request in progress when shutdown began was allowed to finish
        assert!(seen.lock().unwrap().len() <= 2);
        assert!(Arc::ptr_eq(&rec.seen, &seen));
    }

    #[test]
    fn test_shutdown_idle_worker_is_prompt() {
        let (rec, _seen) = recorder(Duration::ZERO);
        let config = WorkerConfig::unbounded("prompt").poll_timeout(Duration::from_secs(10));
        let worker = Worker::spawn(config, rec).unwrap();

        // The stop sentinel wakes the thread without waiting for the poll timeout
        let start = Instant::now();
        worker.shutdown().unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
