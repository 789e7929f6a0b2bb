//! Fixed-interval background loop.
//!
//! Each subsystem (navmesh overlay, navigation, exploration) runs one of these.
//! A failing or panicking tick is logged and the loop carries on with the next
//! iteration.

use std::fmt::Display;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{NavmeshError, Result};

/// Handle to a running loop thread.
pub struct WorkerLoop {
    name: String,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerLoop {
    /// Spawn `tick` on a named thread, called every `interval`.
    pub fn spawn<F, E>(name: &str, interval: Duration, mut tick: F) -> Result<Self>
    where
        F: FnMut() -> std::result::Result<(), E> + Send + 'static,
        E: Display,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let thread_name = name.to_string();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                tracing::info!("{} loop started", thread_name);
                let mut failures: u64 = 0;

                while !stop_flag.load(Ordering::Relaxed) {
                    let tick_start = Instant::now();

                    match catch_unwind(AssertUnwindSafe(&mut tick)) {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            failures += 1;
                            tracing::error!("{} tick failed: {}", thread_name, e);
                        }
                        Err(panic) => {
                            failures += 1;
                            tracing::error!("{} tick panicked: {}", thread_name, panic_message(&panic));
                        }
                    }

                    let elapsed = tick_start.elapsed();
                    if elapsed < interval {
                        thread::sleep(interval - elapsed);
                    }
                }

                tracing::info!("{} loop exited ({} failed ticks)", thread_name, failures);
            })
            .map_err(|e| NavmeshError::Worker(format!("failed to spawn {}: {}", name, e)))?;

        Ok(Self {
            name: name.to_string(),
            stop,
            handle: Some(handle),
        })
    }

    /// Thread name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the thread is still alive.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Raise the stop flag and wait up to `timeout` for the thread to exit.
    ///
    /// Returns `false` when the thread did not exit in time; it is then left
    /// detached and will exit at its next flag check.
    pub fn stop(mut self, timeout: Duration) -> bool {
        self.stop.store(true, Ordering::Relaxed);
        let Some(handle) = self.handle.take() else {
            return true;
        };

        let deadline = Instant::now() + timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                tracing::warn!("{} loop did not stop within {:?}, detaching", self.name, timeout);
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }

        if handle.join().is_err() {
            tracing::error!("{} loop thread panicked on exit", self.name);
        }
        true
    }
}

impl Drop for WorkerLoop {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
