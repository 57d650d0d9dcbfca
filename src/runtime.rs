//! Background task spawning.
//!
//! The UI runs a synchronous frame loop, so work started from it has to land
//! on a tokio runtime it does not own. When called inside a runtime the
//! ambient one is used; otherwise a process-wide multi-threaded runtime is
//! created on first use.

use futures::future::FutureExt;
use once_cell::sync::Lazy;
use std::future::Future;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;

static FALLBACK: Lazy<Runtime> = Lazy::new(|| {
    log::debug!("starting background runtime");
    Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("mapscout-worker")
        .enable_all()
        .build()
        .expect("failed to build background tokio runtime")
});

/// The runtime new tasks are spawned on
pub fn handle() -> Handle {
    Handle::try_current().unwrap_or_else(|_| FALLBACK.handle().clone())
}

/// Spawn a future and get a pollable handle to its output
pub fn spawn<F, T>(future: F) -> Task<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    Task {
        handle: Some(handle().spawn(future)),
    }
}

/// Handle to a spawned task whose output can be collected without blocking
#[derive(Debug)]
pub struct Task<T> {
    handle: Option<JoinHandle<T>>,
}

impl<T> Task<T> {
    /// True once the task has completed, or its output was already taken
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Take the output if the task has completed. A panicked or cancelled
    /// task yields `None` and is logged.
    pub fn try_take(&mut self) -> Option<T> {
        if !self.handle.as_ref()?.is_finished() {
            return None;
        }
        let mut handle = self.handle.take()?;
        match (&mut handle).now_or_never() {
            Some(Ok(output)) => Some(output),
            Some(Err(e)) => {
                log::warn!("background task failed: {}", e);
                None
            }
            None => {
                self.handle = Some(handle);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn test_spawn_outside_runtime() {
        let mut task = spawn(async { 21 * 2 });
        let deadline = Instant::now() + Duration::from_secs(5);
        let value = loop {
            if let Some(v) = task.try_take() {
                break v;
            }
            assert!(Instant::now() < deadline, "task never finished");
            std::thread::sleep(Duration::from_millis(5));
        };
        assert_eq!(value, 42);
        assert!(task.is_finished());
        assert!(task.try_take().is_none());
    }

    #[tokio::test]
    async fn test_spawn_inside_runtime_waits_for_output() {
        let mut task = spawn(async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            7
        });
        assert!(!task.is_finished());
        assert!(task.try_take().is_none());

        let mut value = None;
        for _ in 0..200 {
            value = task.try_take();
            if value.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(value, Some(7));
        assert!(task.is_finished());
    }
}
