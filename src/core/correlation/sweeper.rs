// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic aging sweep.
//!
//! A dedicated thread wakes on a fixed tick and asks its target to evict
//! every partial capture older than the aging timeout. Stopping is
//! synchronous: `stop` returns only after the thread has exited, so no sweep
//! runs concurrently with what the caller does next.

use crate::core::error::CfrResult;
use crossbeam_channel::{bounded, select, tick, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Something the sweeper can age.
pub trait AgingTarget: Send + Sync {
    /// Evict expired partial captures; returns how many were evicted.
    fn sweep_expired(&self) -> usize;
}

#[derive(Debug)]
pub struct AgingSweeper {
    interval: Duration,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl AgingSweeper {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            stop_tx: None,
            handle: None,
        }
    }

    #[inline]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Start ticking. A second call while running is a no-op.
    pub fn start(&mut self, target: Arc<dyn AgingTarget>) -> CfrResult<()> {
        if self.handle.is_some() {
            return Ok(());
        }
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let ticker = tick(self.interval);
        let handle = thread::Builder::new()
            .name("cfr-aging".to_string())
            .spawn(move || loop {
                select! {
                    recv(ticker) -> _ => {
                        let evicted = target.sweep_expired();
                        if evicted > 0 {
                            log::debug!("Aging sweep evicted {} partial captures", evicted);
                        }
                    }
                    recv(stop_rx) -> _ => break,
                }
            })?;
        self.stop_tx = Some(stop_tx);
        self.handle = Some(handle);
        log::debug!("Aging sweeper started, interval {:?}", self.interval);
        Ok(())
    }

    /// Stop and join the sweep thread.
    pub fn stop(&mut self) {
        // Dropping the sender disconnects the channel and wakes the thread
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Aging sweeper thread panicked");
            }
            log::debug!("Aging sweeper stopped");
        }
    }
}

impl Drop for AgingSweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingTarget {
        sweeps: AtomicUsize,
    }

    impl AgingTarget for CountingTarget {
        fn sweep_expired(&self) -> usize {
            self.sweeps.fetch_add(1, Ordering::SeqCst);
            0
        }
    }

    #[test]
    fn test_sweeper_ticks_until_stopped() {
        let target = Arc::new(CountingTarget::default());
        let mut sweeper = AgingSweeper::new(Duration::from_millis(10));
        sweeper.start(target.clone()).unwrap();
        assert!(sweeper.is_running());

        thread::sleep(Duration::from_millis(80));
        sweeper.stop();
        assert!(!sweeper.is_running());

        let after_stop = target.sweeps.load(Ordering::SeqCst);
        assert!(after_stop >= 1);
        thread::sleep(Duration::from_millis(40));
        assert_eq!(target.sweeps.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_stop_without_start() {
        let mut sweeper = AgingSweeper::new(Duration::from_millis(10));
        sweeper.stop();
        assert!(!sweeper.is_running());
    }
}
