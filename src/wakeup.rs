use std::{
    sync::{Arc, Condvar, Mutex, PoisonError},
    thread,
    time::Duration,
};
use tracing::trace;

/// One-shot event shared by all the nodes of a tree.
///
/// Asynchronous nodes emit it from any thread when they have something to report,
/// and the tick loop waits on it instead of sleeping blindly.
#[derive(Debug, Clone, Default)]
pub struct WakeUpSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl WakeUpSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks for at most `timeout` and returns whether the signal fired.
    /// Consumes the signal.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let ready = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut ready, _) = cvar
            .wait_timeout_while(ready, timeout, |ready| !*ready)
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *ready, false)
    }

    pub fn emit_signal(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }
}

/// Emits a [`WakeUpSignal`] from a background thread once a duration has elapsed,
/// unless cancelled first. Dropping the timer cancels it.
#[derive(Debug)]
pub struct DeadlineTimer {
    cancelled: Arc<(Mutex<bool>, Condvar)>,
}

impl DeadlineTimer {
    pub fn start(after: Duration, signal: WakeUpSignal) -> Self {
        let cancelled = Arc::new((Mutex::new(false), Condvar::new()));
        let thread_cancelled = cancelled.clone();
        thread::spawn(move || {
            let (lock, cvar) = &*thread_cancelled;
            let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            let (guard, _) = cvar
                .wait_timeout_while(guard, after, |cancelled| !*cancelled)
                .unwrap_or_else(PoisonError::into_inner);
            if !*guard {
                trace!(?after, "deadline reached");
                signal.emit_signal();
            }
        });
        Self { cancelled }
    }

    pub fn cancel(&self) {
        let (lock, cvar) = &*self.cancelled;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }
}

impl Drop for DeadlineTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Instant;

    #[test]
    fn signal_is_consumed() {
        let signal = WakeUpSignal::new();
        assert!(!signal.wait_for(Duration::ZERO));
        signal.emit_signal();
        assert!(signal.wait_for(Duration::ZERO));
        assert!(!signal.wait_for(Duration::ZERO));
    }

    #[test]
    fn timer_wakes_waiter() {
        let signal = WakeUpSignal::new();
        let _timer = DeadlineTimer::start(Duration::from_millis(20), signal.clone());
        let start = Instant::now();
        assert!(signal.wait_for(Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn cancelled_timer_stays_silent() {
        let signal = WakeUpSignal::new();
        let timer = DeadlineTimer::start(Duration::from_millis(20), signal.clone());
        timer.cancel();
        assert!(!signal.wait_for(Duration::from_millis(60)));
    }
}
