use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::time::{Instant, Sleep};

const DEFAULT_CAPACITY: usize = 64;

/// Recycles timers for delayed remote queries.
///
/// A timer is reset to its new deadline before being handed out again, which also
/// discards a pending fire from its previous use.
#[derive(Debug)]
pub struct TimerPool {
    idle: Mutex<Vec<Pin<Box<Sleep>>>>,
    capacity: usize,
}

impl Default for TimerPool {
    fn default() -> Self {
        TimerPool::new(DEFAULT_CAPACITY)
    }
}

impl TimerPool {
    /// At most `capacity` idle timers are kept; extra ones are dropped on release.
    pub fn new(capacity: usize) -> Self {
        TimerPool {
            idle: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Must be called from within a tokio runtime.
    pub fn acquire(self: &Arc<Self>, delay: Duration) -> PooledTimer {
        let deadline = Instant::now() + delay;
        let recycled = self.idle.lock().ok().and_then(|mut idle| idle.pop());
        let sleep = match recycled {
            Some(mut sleep) => {
                sleep.as_mut().reset(deadline);
                sleep
            }
            None => Box::pin(tokio::time::sleep_until(deadline)),
        };

        PooledTimer {
            sleep: Some(sleep),
            pool: Arc::clone(self),
        }
    }

    fn release(&self, sleep: Pin<Box<Sleep>>) {
        if let Ok(mut idle) = self.idle.lock() {
            if idle.len() < self.capacity {
                idle.push(sleep);
            }
        }
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().map(|idle| idle.len()).unwrap_or(0)
    }
}

/// A timer borrowed from a [`TimerPool`]. Completes at its deadline and goes back to the pool on drop.
#[derive(Debug)]
pub struct PooledTimer {
    sleep: Option<Pin<Box<Sleep>>>,
    pool: Arc<TimerPool>,
}

impl Future for PooledTimer {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        match self.sleep.as_mut() {
            Some(sleep) => sleep.as_mut().poll(cx),
            None => Poll::Ready(()),
        }
    }
}

impl Drop for PooledTimer {
    fn drop(&mut self) {
        if let Some(sleep) = self.sleep.take() {
            self.pool.release(sleep);
        }
    }
}
