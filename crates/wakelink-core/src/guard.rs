//! RAII guards used by the connection state machine.
//!
//! Validation runs inside futures that callers may drop at any await point
//! (a timeout around `get_validated()`, an aborted task). These guards make
//! sure such cancellations still leave the shared state well defined.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Runs a closure when dropped unless it has been disarmed.
///
/// Used to move the state out of `Connecting` when a connection attempt is
/// abandoned before it reached a verdict.
pub(crate) struct AttemptGuard<F: FnOnce()> {
    on_abandon: Option<F>,
}

impl<F: FnOnce()> AttemptGuard<F> {
    pub(crate) fn new(on_abandon: F) -> Self {
        Self {
            on_abandon: Some(on_abandon),
        }
    }

    /// The attempt reached a verdict; nothing to clean up.
    pub(crate) fn disarm(mut self) {
        self.on_abandon = None;
    }
}

impl<F: FnOnce()> Drop for AttemptGuard<F> {
    fn drop(&mut self) {
        if let Some(on_abandon) = self.on_abandon.take() {
            on_abandon();
        }
    }
}

/// Exclusive claim on an in-flight flag, released on drop.
///
/// At most one holder exists per flag, which bounds background revalidation
/// to a single task no matter how many callers hit an expired cache.
#[derive(Debug)]
pub(crate) struct InFlight {
    flag: Arc<AtomicBool>,
}

impl InFlight {
    /// Claim the flag, or `None` if another holder exists.
    pub(crate) fn try_claim(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                flag: Arc::clone(flag),
            })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_attempt_guard_runs_on_drop() {
        let ran = Cell::new(false);
        {
            let _guard = AttemptGuard::new(|| ran.set(true));
        }
        assert!(ran.get());
    }

    #[test]
    fn test_disarmed_guard_does_nothing() {
        let ran = Cell::new(false);
        let guard = AttemptGuard::new(|| ran.set(true));
        guard.disarm();
        assert!(!ran.get());
    }

    #[test]
    fn test_in_flight_is_exclusive() {
        let flag = Arc::new(AtomicBool::new(false));

        let first = InFlight::try_claim(&flag).expect("first claim succeeds");
        assert!(InFlight::try_claim(&flag).is_none());

        drop(first);
        assert!(!flag.load(Ordering::SeqCst));
        assert!(InFlight::try_claim(&flag).is_some());
    }
}
