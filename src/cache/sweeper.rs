//! Background Maintenance Threads
//!
//! Both tiers run a periodic expiry sweep and the manager optionally runs a
//! warming pass. All three share this harness: a plain thread ticking on a
//! channel timeout, signalled and joined when its handle drops. A cycle that
//! panics is logged and the loop continues on the next tick.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{bounded, RecvTimeoutError, Sender};

/// Outcome of one maintenance cycle
pub enum Cycle {
    /// Run again on the next tick
    Continue,
    /// The swept resource is gone; exit the thread
    Stop,
}

/// Handle owning a maintenance thread
///
/// Dropping the handle signals the thread and joins it.
pub struct SweeperHandle {
    shutdown: Sender<()>,
    join: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Spawn a maintenance thread running `cycle` every `interval`
    ///
    /// The closure should hold only a `Weak` reference to the maintained
    /// resource and return [`Cycle::Stop`] once the upgrade fails, so a
    /// sweeper never keeps a dropped cache alive.
    pub fn spawn<F>(name: &str, interval: Duration, mut cycle: F) -> Self
    where
        F: FnMut() -> Cycle + Send + 'static,
    {
        let (shutdown, signal) = bounded::<()>(1);
        let thread_name = format!("stratacache-{}", name);

        let join = std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || loop {
                match signal.recv_timeout(interval) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {
                        let outcome = catch_unwind(AssertUnwindSafe(&mut cycle));
                        match outcome {
                            Ok(Cycle::Continue) => {}
                            Ok(Cycle::Stop) => break,
                            Err(_) => {
                                tracing::warn!(thread = %thread_name, "maintenance cycle panicked, continuing");
                            }
                        }
                    }
                }
            })
            .expect("failed to spawn maintenance thread");

        Self {
            shutdown,
            join: Some(join),
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        let _ = self.shutdown.try_send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
