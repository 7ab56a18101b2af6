use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

/// At most one pending delayed task. Rescheduling aborts the previous one.
///
/// Each schedule gets a generation number; the task hands it back through
/// [`DebounceTask::release`] when it fires so that a superseded task can tell
/// it lost the race, and so the firing task is never aborted by its own owner.
#[derive(Debug, Default)]
pub struct DebounceTask {
    handle: Option<JoinHandle<()>>,
    generation: u64,
}

impl DebounceTask {
    pub fn schedule<F, Fut>(&mut self, delay: Duration, make: F) -> u64
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.generation += 1;
        let fire = make(self.generation);
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fire.await;
        }));
        self.generation
    }

    /// Returns true when a pending task was aborted.
    pub fn cancel(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                let pending = !handle.is_finished();
                handle.abort();
                pending
            }
            None => false,
        }
    }

    /// Detaches the task for `generation` without aborting it. False when the
    /// task was cancelled or rescheduled in the meantime.
    pub fn release(&mut self, generation: u64) -> bool {
        if self.generation == generation && self.handle.is_some() {
            self.handle = None;
            true
        } else {
            false
        }
    }

    pub fn is_pending(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for DebounceTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
