use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Handle to background work spawned by an intercepted call.
///
/// The work runs on its own thread and reports an exit code; the context
/// joins pending tasks best-effort at teardown.
pub struct DelayedTask {
    handle: JoinHandle<i32>,
}

impl DelayedTask {
    pub fn spawn(work: impl FnOnce() -> i32 + Send + 'static) -> Self {
        DelayedTask {
            handle: std::thread::spawn(work),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    fn join(self) {
        match self.handle.join() {
            Ok(code) => debug!(code, "delayed task finished"),
            Err(_) => warn!("delayed task panicked"),
        }
    }
}

/// Join every finished task, waiting up to `deadline` for stragglers.
/// Whatever is still running afterwards is abandoned.
pub(crate) fn join_with_deadline(mut tasks: Vec<DelayedTask>, deadline: Duration) {
    let until = Instant::now() + deadline;
    loop {
        let (finished, pending): (Vec<_>, Vec<_>) =
            tasks.into_iter().partition(DelayedTask::is_finished);
        for task in finished {
            task.join();
        }
        if pending.is_empty() {
            return;
        }
        if Instant::now() >= until {
            warn!(abandoned = pending.len(), "abandoning unfinished delayed tasks");
            return;
        }
        tasks = pending;
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_completed_work() {
        let task = DelayedTask::spawn(|| 7);
        while !task.is_finished() {
            std::thread::sleep(Duration::from_millis(1));
        }
        join_with_deadline(vec![task], Duration::from_millis(100));
    }

    #[test]
    fn abandons_stuck_work() {
        let task = DelayedTask::spawn(|| {
            std::thread::sleep(Duration::from_secs(30));
            0
        });
        let started = Instant::now();
        join_with_deadline(vec![task], Duration::from_millis(50));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
