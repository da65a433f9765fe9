/// Main-loop task queue.
///
/// The only bridge between connection tasks and the frame thread.  Connection
/// handlers `enqueue` closures; the frame loop calls `drain_and_run_once`
/// exactly once per tick, handing every task the frame-owned context `C`
/// (the collaborators).  Nothing else ever sees `C`, so collaborator state is
/// only touched on the frame thread.
///
/// ```text
///   conn 1 ──┐
///   conn 2 ──┼── enqueue ──► [ Mutex<VecDeque<Task>> ] ── drain (per tick) ──► task(&mut C)
///   conn N ──┘
/// ```
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};

use parking_lot::Mutex;
use tracing::{debug, error};

/// A deferred, single-shot unit of work for the frame thread.
pub struct Task<C> {
    label: &'static str,
    run: Box<dyn FnOnce(&mut C) + Send + 'static>,
}

impl<C> Task<C> {
    pub fn new<F>(label: &'static str, run: F) -> Self
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        Self {
            label,
            run: Box::new(run),
        }
    }
}

pub struct TaskQueue<C> {
    pending: Mutex<VecDeque<Task<C>>>,
}

impl<C> Default for TaskQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> TaskQueue<C> {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
        }
    }

    /// Callable from any thread.
    pub fn enqueue(&self, task: Task<C>) {
        self.pending.lock().push_back(task);
    }

    pub fn push<F>(&self, label: &'static str, run: F)
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        self.enqueue(Task::new(label, run));
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Run every task queued before this call, in submission order, and
    /// return how many ran.  Never waits for work.  The batch is detached
    /// before anything runs, so tasks enqueued meanwhile land on the next tick.
    pub fn drain_and_run_once(&self, context: &mut C) -> usize {
        let batch = std::mem::take(&mut *self.pending.lock());
        let count = batch.len();

        for task in batch {
            let label = task.label;
            debug!("frame task: {}", label);
            let run = task.run;
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| run(&mut *context))) {
                error!("Task {} panicked: {}", label, panic_message(&panic));
            }
        }

        count
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_drains_in_fifo_order() {
        let queue: TaskQueue<Vec<u32>> = TaskQueue::new();
        for i in 0..5 {
            queue.push("push", move |log: &mut Vec<u32>| log.push(i));
        }
        assert_eq!(queue.len(), 5);

        let mut log = Vec::new();
        assert_eq!(queue.drain_and_run_once(&mut log), 5);
        assert_eq!(log, vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
        assert_eq!(queue.drain_and_run_once(&mut log), 0);
    }

    #[test]
    fn test_tasks_enqueued_during_drain_wait_for_next_tick() {
        struct Ctx {
            queue: Arc<TaskQueue<Ctx>>,
            log: Vec<&'static str>,
        }

        let queue = Arc::new(TaskQueue::new());
        let mut ctx = Ctx {
            queue: queue.clone(),
            log: Vec::new(),
        };

        queue.push("outer", |ctx: &mut Ctx| {
            ctx.log.push("outer");
            ctx.queue.push("inner", |ctx: &mut Ctx| ctx.log.push("inner"));
        });

        assert_eq!(queue.drain_and_run_once(&mut ctx), 1);
        assert_eq!(ctx.log, vec!["outer"]);
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.drain_and_run_once(&mut ctx), 1);
        assert_eq!(ctx.log, vec!["outer", "inner"]);
    }

    #[test]
    fn test_panicking_task_does_not_stop_batch() {
        let queue: TaskQueue<Vec<u32>> = TaskQueue::new();
        queue.push("first", |log: &mut Vec<u32>| log.push(1));
        queue.push("boom", |_: &mut Vec<u32>| panic!("collaborator fault"));
        queue.push("third", |log: &mut Vec<u32>| log.push(3));

        let mut log = Vec::new();
        assert_eq!(queue.drain_and_run_once(&mut log), 3);
        assert_eq!(log, vec![1, 3]);
    }

    #[test]
    fn test_enqueue_from_many_threads() {
        let queue: Arc<TaskQueue<Vec<usize>>> = Arc::new(TaskQueue::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let q = queue.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        q.push("n", move |log: &mut Vec<usize>| log.push(t * 1000 + i));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut log = Vec::new();
        assert_eq!(queue.drain_and_run_once(&mut log), 400);
        // Per-thread submission order survives the interleaving
        for t in 0..4 {
            let mine: Vec<usize> = log.iter().copied().filter(|v| v / 1000 == t).collect();
            let expected: Vec<usize> = (0..100).map(|i| t * 1000 + i).collect();
            assert_eq!(mine, expected);
        }
    }
}
