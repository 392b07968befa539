//! Session-wide run queue.
//!
//! Every evaluate call, for every model in a session, goes through one queue:
//!
//! ```text
//! enqueue ──► [ T1 ][ T2 ][ T3 ] ──► drain task ──► spawn(Tn) ──► await ──► next
//! ```
//!
//! - Task bodies never overlap: the drain task awaits each one to completion.
//! - Tasks start in the order `enqueue` was called (the channel fixes the order
//!   at call time, not at first poll).
//! - A task that fails, panics or times out settles its own handle and the drain
//!   task moves on to the next entry.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::RunError;

type Job = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

pub struct RunQueue {
    tx: mpsc::UnboundedSender<Job>,
    timeout: Option<Duration>,
    next_id: AtomicU64,
    pending: Arc<AtomicUsize>,
}

/// Handle to one queued task. Resolves once the task has settled.
///
/// Dropping the handle does not cancel the task; it still runs in its slot.
#[must_use = "a queued run settles regardless; await it to observe the result"]
pub struct QueuedRun<T> {
    id: u64,
    rx: oneshot::Receiver<Result<T, RunError>>,
}

impl<T> QueuedRun<T> {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl<T> Future for QueuedRun<T> {
    type Output = Result<T, RunError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // Sender dropped without a result: the task panicked or never ran.
            Poll::Ready(Err(_)) => Poll::Ready(Err(RunError::Aborted)),
            Poll::Pending => Poll::Pending,
        }
    }
}

struct PendingGuard(Arc<AtomicUsize>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl RunQueue {
    /// Create a queue and spawn its drain task. Must be called inside a Tokio runtime.
    pub fn new() -> Self {
        Self::with_timeout(None)
    }

    /// Like [`RunQueue::new`], with a limit on each task body.
    ///
    /// A body that exceeds `timeout` is dropped and settles as
    /// [`RunError::TimedOut`]; the next task starts straight away. Dropping the
    /// future is the only cancellation the queue can perform, so tasks must
    /// not leave work running once their future is gone (for example a
    /// detached `spawn_blocking` call). Otherwise a timed-out run can overlap
    /// the next one.
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(drain(rx));
        Self {
            tx,
            timeout,
            next_id: AtomicU64::new(1),
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Tasks enqueued and not yet settled.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Append `task` to the queue. Its position is fixed by this call.
    pub fn enqueue<T, E, F, Fut>(&self, task: F) -> QueuedRun<T>
    where
        T: Send + 'static,
        E: Into<RunError> + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (done_tx, done_rx) = oneshot::channel();
        let timeout = self.timeout;

        self.pending.fetch_add(1, Ordering::AcqRel);
        let guard = PendingGuard(Arc::clone(&self.pending));

        let job: Job = Box::new(move || {
            Box::pin(async move {
                debug!(run = id, "run started");
                let body = async move { task().await.map_err(Into::into) };
                let result = match timeout {
                    Some(limit) => match tokio::time::timeout(limit, body).await {
                        Ok(r) => r,
                        Err(_) => Err(RunError::TimedOut(limit)),
                    },
                    None => body.await,
                };
                debug!(run = id, ok = result.is_ok(), "run settled");
                drop(guard);
                // The caller may have dropped its handle; nothing to report then.
                let _ = done_tx.send(result);
            })
        });

        if self.tx.send(job).is_err() {
            // Drain task is gone (runtime shutting down). The job, and with it the
            // result sender, is dropped here so the handle resolves to `Aborted`.
            warn!(run = id, "run queue closed; dropping run");
        }

        QueuedRun { id, rx: done_rx }
    }

    /// Resolves once everything enqueued before it has settled.
    pub fn barrier(&self) -> QueuedRun<()> {
        self.enqueue(|| async { Ok::<(), RunError>(()) })
    }
}

impl Default for RunQueue {
    fn default() -> Self {
        Self::new()
    }
}

async fn drain(mut rx: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = rx.recv().await {
        // Spawned so a panic stays inside the task; awaited so the next task
        // cannot start before this one settles.
        if let Err(e) = tokio::spawn(job()).await {
            warn!("queued run panicked: {}", e);
        }
    }
    debug!("run queue closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn task_bodies_never_overlap() {
        let queue = Arc::new(RunQueue::new());
        let inside = Arc::new(AtomicBool::new(false));
        let spans = Arc::new(Mutex::new(Vec::new()));

        // Producers race each other; the queue still runs one body at a time.
        let mut producers = Vec::new();
        for i in 0..12u64 {
            let queue = Arc::clone(&queue);
            let inside = Arc::clone(&inside);
            let spans = Arc::clone(&spans);
            producers.push(tokio::spawn(async move {
                queue
                    .enqueue(move || async move {
                        assert!(!inside.swap(true, Ordering::SeqCst), "bodies overlapped");
                        let start = Instant::now();
                        tokio::time::sleep(Duration::from_millis(1 + i % 4)).await;
                        let end = Instant::now();
                        inside.store(false, Ordering::SeqCst);
                        spans.lock().unwrap().push((start, end));
                        Ok::<_, RunError>(())
                    })
                    .await
            }));
        }
        for p in producers {
            p.await.unwrap().unwrap();
        }

        let mut spans = spans.lock().unwrap().clone();
        assert_eq!(spans.len(), 12);
        spans.sort_by_key(|(start, _)| *start);
        for w in spans.windows(2) {
            assert!(w[1].0 >= w[0].1, "a body started before the previous one ended");
        }
    }

    #[tokio::test]
    async fn tasks_start_in_enqueue_order() {
        let queue = RunQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut runs = Vec::new();
        for i in 0..8u64 {
            let order = Arc::clone(&order);
            runs.push(queue.enqueue(move || async move {
                order.lock().unwrap().push(i);
                // Early tasks are the slow ones.
                tokio::time::sleep(Duration::from_millis(8 - i)).await;
                Ok::<_, RunError>(i)
            }));
        }
        for (i, run) in runs.into_iter().enumerate() {
            assert_eq!(run.await.unwrap(), i as u64);
        }
        assert_eq!(*order.lock().unwrap(), (0..8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn failure_does_not_block_later_tasks() {
        let queue = RunQueue::new();
        let failing = queue.enqueue(|| async {
            Err::<(), _>(EngineError::Backend("session already started".into()))
        });
        let next = queue.enqueue(|| async { Ok::<_, RunError>(7) });

        assert!(matches!(failing.await, Err(RunError::Engine(EngineError::Backend(_)))));
        assert_eq!(next.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn panicking_task_resolves_as_aborted() {
        let queue = RunQueue::new();
        let boom = queue.enqueue(|| async {
            if true {
                panic!("engine exploded");
            }
            Ok::<(), RunError>(())
        });
        let after = queue.enqueue(|| async { Ok::<_, RunError>("still running") });

        assert_eq!(boom.await, Err(RunError::Aborted));
        assert_eq!(after.await.unwrap(), "still running");
    }

    #[tokio::test]
    async fn timed_out_body_is_dropped_before_next_run() {
        struct SetOnDrop(Arc<AtomicBool>);
        impl Drop for SetOnDrop {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let queue = RunQueue::with_timeout(Some(Duration::from_millis(10)));
        let dropped = Arc::new(AtomicBool::new(false));
        let flag = SetOnDrop(Arc::clone(&dropped));
        let stuck = queue.enqueue(move || async move {
            let _flag = flag;
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<(), RunError>(())
        });
        let seen = Arc::clone(&dropped);
        let next = queue.enqueue(move || async move {
            Ok::<_, RunError>(seen.load(Ordering::SeqCst))
        });

        assert!(matches!(stuck.await, Err(RunError::TimedOut(_))));
        assert!(next.await.unwrap(), "stuck body still alive when the next run began");
    }

    #[tokio::test]
    async fn timeout_settles_stuck_task() {
        let queue = RunQueue::with_timeout(Some(Duration::from_millis(20)));
        let stuck = queue.enqueue(|| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<(), RunError>(())
        });
        let next = queue.enqueue(|| async { Ok::<_, RunError>(1) });

        assert_eq!(stuck.await, Err(RunError::TimedOut(Duration::from_millis(20))));
        assert_eq!(next.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn barrier_waits_for_earlier_work() {
        let queue = RunQueue::new();
        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);
        let _run = queue.enqueue(move || async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            flag.store(true, Ordering::SeqCst);
            Ok::<(), RunError>(())
        });

        queue.barrier().await.unwrap();
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(queue.pending(), 0);
    }
}
