/*!
 * Trigger Variable
 *
 * Two-state signal: a trigger must be activated before it can fire, and
 * waiters block only while it is active and not yet fired.
 */

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Activation/completion signal
#[derive(Debug, Default)]
pub struct TriggerVariable {
    triggered: AtomicBool,
    activated: Mutex<bool>,
    cv_trigger: Condvar,
    cv_active: Condvar,
}

impl TriggerVariable {
    /// Create a trigger, optionally already active
    pub fn new(active: bool) -> Self {
        Self {
            triggered: AtomicBool::new(false),
            activated: Mutex::new(active),
            cv_trigger: Condvar::new(),
            cv_active: Condvar::new(),
        }
    }

    /// Arm the trigger and clear a previous firing
    ///
    /// Returns `false` if it was already active.
    pub fn activate(&self) -> bool {
        let mut activated = self.activated.lock();
        if *activated {
            return false;
        }
        self.triggered.store(false, Ordering::Release);
        *activated = true;
        self.cv_active.notify_all();
        true
    }

    /// Fire the trigger
    ///
    /// Returns `false` if it has not been activated.
    pub fn trigger(&self) -> bool {
        let activated = self.activated.lock();
        if !*activated {
            return false;
        }
        self.triggered.store(true, Ordering::Release);
        self.cv_trigger.notify_all();
        true
    }

    #[inline]
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    pub fn is_active(&self) -> bool {
        *self.activated.lock()
    }

    /// Block until fired; returns immediately when inactive
    pub fn wait(&self) {
        let mut activated = self.activated.lock();
        while *activated && !self.is_triggered() {
            self.cv_trigger.wait(&mut activated);
        }
    }

    /// Wait up to `timeout` for the trigger to fire
    ///
    /// Returns `false` only if it is active and still unfired at the deadline.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let mut activated = self.activated.lock();
        if !*activated || self.is_triggered() {
            return true;
        }
        // A reset while waiting also releases the waiter
        !self
            .cv_trigger
            .wait_while_for(&mut activated, |a| *a && !self.is_triggered(), timeout)
            .timed_out()
    }

    /// Block until the trigger is activated
    pub fn wait_activation(&self) {
        let mut activated = self.activated.lock();
        while !*activated {
            self.cv_active.wait(&mut activated);
        }
    }

    /// Wait up to `timeout` for activation
    pub fn wait_for_activation(&self, timeout: Duration) -> bool {
        let mut activated = self.activated.lock();
        if *activated {
            return true;
        }
        !self
            .cv_active
            .wait_while_for(&mut activated, |a| !*a, timeout)
            .timed_out()
    }

    /// Return to the inactive state, firing first so no waiter is stranded
    pub fn reset(&self) {
        let mut activated = self.activated.lock();
        if *activated && !self.is_triggered() {
            self.triggered.store(true, Ordering::Release);
            self.cv_trigger.notify_all();
        }
        *activated = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_trigger_requires_activation() {
        let trigger = TriggerVariable::default();
        assert!(!trigger.is_triggered());
        assert!(!trigger.trigger());
        assert!(trigger.activate());
        assert!(!trigger.activate());
        assert!(!trigger.is_triggered());
        assert!(trigger.trigger());
        assert!(trigger.is_triggered());
    }

    #[test]
    fn test_wait_returns_after_trigger() {
        let trigger = Arc::new(TriggerVariable::new(true));
        let waiter = {
            let trigger = trigger.clone();
            thread::spawn(move || trigger.wait())
        };
        thread::sleep(Duration::from_millis(20));
        assert!(trigger.trigger());
        waiter.join().unwrap();
    }

    #[test]
    fn test_wait_for_times_out_while_active() {
        let trigger = TriggerVariable::new(true);
        assert!(!trigger.wait_for(Duration::from_millis(10)));
        assert!(TriggerVariable::new(false).wait_for(Duration::from_millis(10)));
    }

    #[test]
    fn test_wait_activation() {
        let trigger = Arc::new(TriggerVariable::default());
        assert!(!trigger.wait_for_activation(Duration::from_millis(10)));
        let waiter = {
            let trigger = trigger.clone();
            thread::spawn(move || trigger.wait_activation())
        };
        trigger.activate();
        waiter.join().unwrap();
        assert!(trigger.wait_for_activation(Duration::from_millis(10)));
    }

    #[test]
    fn test_reset_fires_then_deactivates() {
        let trigger = TriggerVariable::new(true);
        trigger.reset();
        assert!(!trigger.is_active());
        assert!(trigger.is_triggered());

        assert!(trigger.activate());
        assert!(!trigger.is_triggered());
    }
}
