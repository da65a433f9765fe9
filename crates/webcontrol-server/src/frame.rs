//! Frame-loop driver for hosts without an engine of their own.
//!
//! An engine embedding the server calls `TaskQueue::drain_and_run_once` from
//! its own update hook instead; the daemon uses [`FrameLoop`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::host::Host;
use crate::queue::TaskQueue;

pub struct FrameLoop {
    queue: Arc<TaskQueue<Host>>,
    host: Host,
    frame: Duration,
    last: Instant,
}

impl FrameLoop {
    pub fn new(queue: Arc<TaskQueue<Host>>, host: Host, tick_hz: u32) -> Self {
        Self {
            queue,
            host,
            frame: Duration::from_secs(1) / tick_hz.max(1),
            last: Instant::now(),
        }
    }

    /// One frame: run every queued task, then the host's per-frame work.
    /// Returns how many tasks ran.
    pub fn tick(&mut self) -> usize {
        let ran = self.queue.drain_and_run_once(&mut self.host);

        let now = Instant::now();
        let dt = now.duration_since(self.last).as_secs_f64();
        self.last = now;
        self.host.update(dt);

        if ran > 0 {
            debug!("frame ran {} tasks", ran);
        }
        ran
    }

    /// Tick at the configured rate until `stop` is raised.  Blocks the
    /// calling thread, which must be the one that built the `Host`.
    pub fn run(mut self, stop: Arc<AtomicBool>) {
        info!("Frame loop running at {:?} per frame", self.frame);
        while !stop.load(Ordering::Relaxed) {
            let started = Instant::now();
            self.tick();
            if let Some(rest) = self.frame.checked_sub(started.elapsed()) {
                std::thread::sleep(rest);
            }
        }
        // Anything queued before the stop still runs
        self.tick();
        info!("Frame loop stopped");
    }
}
