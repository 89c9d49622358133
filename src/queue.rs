//! A queue which runs at most `N` tasks at a time.

use crate::errors::TaskAbandoned;
use failure::Error;
use futures::future::{BoxFuture, FutureExt};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use tokio::sync::oneshot;

pub const DEFAULT_CONCURRENCY: usize = 3;

type Task<T> = Box<dyn FnOnce() -> BoxFuture<'static, Result<T, Error>> + Send>;

/// A FIFO task queue with a fixed concurrency limit.
///
/// Tasks are started in the order they were enqueued, and each task's result
/// is reported through the [`OutcomeHandle`] returned by
/// [`TaskQueue::enqueue()`]. A task which fails has no effect on any other
/// task.
///
/// There is no way to cancel a task once it has been enqueued.
pub struct TaskQueue<T> {
    state: Arc<Mutex<State<T>>>,
}

struct State<T> {
    concurrency: usize,
    running: usize,
    pending: VecDeque<QueueEntry<T>>,
}

struct QueueEntry<T> {
    task: Task<T>,
    outcome: oneshot::Sender<Result<T, Error>>,
}

impl<T: Send + 'static> TaskQueue<T> {
    /// Create a queue which runs up to `concurrency` tasks at once. A limit of
    /// zero is treated as one.
    pub fn new(concurrency: usize) -> TaskQueue<T> {
        TaskQueue {
            state: Arc::new(Mutex::new(State {
                concurrency: concurrency.max(1),
                running: 0,
                pending: VecDeque::new(),
            })),
        }
    }

    /// Add a task to the queue, starting it straight away if there is a free
    /// slot.
    ///
    /// This never waits for the task. It must be called from within a `tokio`
    /// runtime because tasks are spawned onto it.
    pub fn enqueue<F, Fut>(&self, task: F) -> OutcomeHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, Error>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let entry = QueueEntry {
            task: Box::new(move || task().boxed()),
            outcome: tx,
        };

        self.lock().pending.push_back(entry);
        self.dequeue();

        OutcomeHandle { outcome: rx }
    }

    /// Start pending tasks until we run out of tasks or slots.
    fn dequeue(&self) {
        loop {
            let QueueEntry { task, outcome } = {
                let mut state = self.lock();

                if state.running >= state.concurrency {
                    return;
                }

                match state.pending.pop_front() {
                    Some(entry) => {
                        state.running += 1;
                        entry
                    },
                    None => return,
                }
            };

            let slot = Slot {
                queue: self.clone(),
            };
            let running = task();

            tokio::spawn(async move {
                let result = running.await;
                // the receiver may have been dropped, which is fine
                let _ = outcome.send(result);
                drop(slot);
            });
        }
    }

    pub fn concurrency(&self) -> usize {
        self.lock().concurrency
    }

    /// The number of tasks currently running.
    pub fn running(&self) -> usize {
        self.lock().running
    }

    /// The number of tasks waiting for a free slot.
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        // the state is always left consistent, so poisoning doesn't matter
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T: Send + 'static> Default for TaskQueue<T> {
    fn default() -> TaskQueue<T> {
        TaskQueue::new(DEFAULT_CONCURRENCY)
    }
}

impl<T> Clone for TaskQueue<T> {
    fn clone(&self) -> TaskQueue<T> {
        TaskQueue {
            state: Arc::clone(&self.state),
        }
    }
}

/// Frees up a running slot when a task settles, even if it panicked.
struct Slot<T: Send + 'static> {
    queue: TaskQueue<T>,
}

impl<T: Send + 'static> Drop for Slot<T> {
    fn drop(&mut self) {
        self.queue.lock().running -= 1;
        self.queue.dequeue();
    }
}

/// The eventual result of a queued task.
///
/// Resolves to whatever the task returned, or [`TaskAbandoned`] if the task
/// panicked before it could finish.
#[derive(Debug)]
pub struct OutcomeHandle<T> {
    outcome: oneshot::Receiver<Result<T, Error>>,
}

impl<T> Future for OutcomeHandle<T> {
    type Output = Result<T, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.outcome).poll(cx).map(|got| match got {
            Ok(result) => result,
            Err(_) => Err(TaskAbandoned.into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use failure::Fail;
    use futures::future::join_all;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq, Fail)]
    #[fail(display = "Task {} blew up", _0)]
    struct Boom(usize);

    #[derive(Default)]
    struct Gauge {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Gauge {
        fn enter(&self) {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
        }

        fn exit(&self) {
            self.current.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn never_run_more_than_the_concurrency_limit() {
        let queue = TaskQueue::new(2);
        let gauge = Arc::new(Gauge::default());
        let mut releases = Vec::new();
        let mut handles = Vec::new();

        for i in 0..5 {
            let (release, released) = oneshot::channel::<()>();
            releases.push(release);
            let gauge = Arc::clone(&gauge);

            handles.push(queue.enqueue(move || {
                gauge.enter();

                async move {
                    let _ = released.await;
                    gauge.exit();
                    Ok(i)
                }
            }));
        }

        assert_eq!(queue.running(), 2);
        assert_eq!(queue.pending(), 3);
        assert_eq!(gauge.current.load(Ordering::SeqCst), 2);

        for release in releases {
            release.send(()).unwrap();
            tokio::task::yield_now().await;
        }

        let got: Vec<usize> = join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(got, vec![0, 1, 2, 3, 4]);
        assert_eq!(gauge.peak.load(Ordering::SeqCst), 2);
        assert_eq!(queue.running(), 0);
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn tasks_start_in_the_order_they_were_enqueued() {
        for concurrency in vec![1, 3] {
            let queue = TaskQueue::new(concurrency);
            let started = Arc::new(Mutex::new(Vec::new()));

            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let started = Arc::clone(&started);

                    queue.enqueue(move || {
                        started.lock().unwrap().push(i);

                        async move {
                            tokio::task::yield_now().await;
                            Ok(())
                        }
                    })
                })
                .collect();

            for handle in join_all(handles).await {
                handle.unwrap();
            }

            let started = started.lock().unwrap().clone();
            assert_eq!(started, (0..8).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn a_failing_task_doesnt_affect_the_others() {
        let queue = TaskQueue::new(2);

        let handles: Vec<_> = (0..4)
            .map(|i| {
                queue.enqueue(move || async move {
                    tokio::task::yield_now().await;

                    if i == 1 {
                        Err(Boom(i).into())
                    } else {
                        Ok(i * 10)
                    }
                })
            })
            .collect();

        let mut results = join_all(handles).await.into_iter();

        assert_eq!(results.next().unwrap().unwrap(), 0);
        let err = results.next().unwrap().unwrap_err();
        assert_eq!(err.downcast_ref::<Boom>(), Some(&Boom(1)));
        assert_eq!(results.next().unwrap().unwrap(), 20);
        assert_eq!(results.next().unwrap().unwrap(), 30);
    }

    #[tokio::test]
    async fn a_panicking_task_is_abandoned_and_frees_its_slot() {
        let queue = TaskQueue::new(1);

        let panicked = queue.enqueue(|| async {
            tokio::task::yield_now().await;
            let nothing: Vec<usize> = Vec::new();
            Ok(nothing[0])
        });
        let next = queue.enqueue(|| async { Ok(1) });

        let err = panicked.await.unwrap_err();
        assert!(err.downcast_ref::<TaskAbandoned>().is_some());
        assert_eq!(next.await.unwrap(), 1);
    }

    #[test]
    fn a_zero_limit_still_makes_progress() {
        let queue: TaskQueue<()> = TaskQueue::new(0);

        assert_eq!(queue.concurrency(), 1);
    }
}
