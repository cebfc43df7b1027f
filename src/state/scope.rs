//! Scope tracking from right mouse button events
//!
//! A short right-click (tap) toggles the scope open or closed; holding the
//! button keeps it open for as long as it is held. A toggled scope with no
//! right-click activity for the configured timeout closes itself.

use std::time::{Duration, Instant};

use tracing::debug;

/// Outcome of feeding a release into the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The press was short enough to count as a tap; carries the new toggle
    Toggled(bool),
    /// Held too long to be a tap (or the press was never seen)
    Held,
}

#[derive(Debug, Clone)]
pub struct ScopeTracker {
    toggled: bool,
    held_down: bool,
    pressed_at: Option<Instant>,
    last_activity: Option<Instant>,
    tap_threshold: Duration,
    timeout: Duration,
}

impl ScopeTracker {
    pub fn new(tap_threshold: Duration, timeout: Duration) -> Self {
        Self {
            toggled: false,
            held_down: false,
            pressed_at: None,
            last_activity: None,
            tap_threshold,
            timeout,
        }
    }

    /// Right button went down
    pub fn press(&mut self, at: Instant) {
        self.pressed_at = Some(at);
        self.held_down = true;
        self.last_activity = Some(at);
    }

    /// Right button came up
    pub fn release(&mut self, at: Instant) -> ReleaseOutcome {
        self.held_down = false;
        self.last_activity = Some(at);

        let Some(pressed_at) = self.pressed_at.take() else {
            debug!("right release without a recorded press");
            return ReleaseOutcome::Held;
        };

        let duration = at.saturating_duration_since(pressed_at);
        if duration < self.tap_threshold {
            self.toggled = !self.toggled;
            debug!(duration_ms = duration.as_millis() as u64, toggled = self.toggled, "scope tap");
            ReleaseOutcome::Toggled(self.toggled)
        } else {
            ReleaseOutcome::Held
        }
    }

    /// Close a toggled scope after the inactivity window
    ///
    /// Returns true when the scope was reset by this call.
    pub fn check_timeout(&mut self, now: Instant) -> bool {
        if !self.toggled {
            return false;
        }
        let idle = self
            .last_activity
            .map(|t| now.saturating_duration_since(t))
            .unwrap_or(Duration::MAX);
        if idle > self.timeout {
            self.toggled = false;
            true
        } else {
            false
        }
    }

    /// Refresh the inactivity timer without changing state
    pub fn touch(&mut self, at: Instant) {
        self.last_activity = Some(at);
    }

    /// Clear a stale held-down flag when the button is known to be up
    ///
    /// The press timestamp is kept so a late release still counts as a tap.
    /// Returns true when the flag was cleared.
    pub fn reconcile_button(&mut self, physically_down: bool) -> bool {
        if self.held_down && !physically_down {
            self.held_down = false;
            true
        } else {
            false
        }
    }

    pub fn is_active(&self) -> bool {
        self.toggled || self.held_down
    }

    pub fn toggled(&self) -> bool {
        self.toggled
    }

    #[cfg(test)]
    pub fn held_down(&self) -> bool {
        self.held_down
    }

    pub fn set_tap_threshold(&mut self, threshold: Duration) {
        self.tap_threshold = threshold;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> ScopeTracker {
        ScopeTracker::new(Duration::from_millis(300), Duration::from_secs(30))
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_tap_toggles() {
        let mut scope = tracker();
        let t0 = Instant::now();

        scope.press(t0);
        assert!(scope.is_active());
        assert_eq!(scope.release(t0 + ms(120)), ReleaseOutcome::Toggled(true));
        assert!(scope.toggled());
        assert!(!scope.held_down());
        assert!(scope.is_active());
    }

    #[test]
    fn test_two_taps_restore_toggle() {
        let mut scope = tracker();
        let t0 = Instant::now();

        scope.press(t0);
        scope.release(t0 + ms(100));
        scope.press(t0 + ms(200));
        scope.release(t0 + ms(350));

        assert!(!scope.toggled());
        assert!(!scope.is_active());
    }

    #[test]
    fn test_long_hold_does_not_toggle() {
        let mut scope = tracker();
        let t0 = Instant::now();

        scope.press(t0);
        assert!(scope.is_active());
        assert_eq!(scope.release(t0 + ms(300)), ReleaseOutcome::Held);
        assert!(!scope.is_active());
    }

    #[test]
    fn test_release_without_press() {
        let mut scope = tracker();
        assert_eq!(scope.release(Instant::now()), ReleaseOutcome::Held);
        assert!(!scope.toggled());
    }

    #[test]
    fn test_auto_reset_after_inactivity() {
        let mut scope = tracker();
        let t0 = Instant::now();
        scope.press(t0);
        scope.release(t0 + ms(50));
        assert!(scope.toggled());

        assert!(!scope.check_timeout(t0 + Duration::from_secs(30)));
        assert!(scope.toggled());

        assert!(scope.check_timeout(t0 + Duration::from_secs(31)));
        assert!(!scope.toggled());
        assert!(!scope.check_timeout(t0 + Duration::from_secs(60)));
    }

    #[test]
    fn test_touch_extends_timeout() {
        let mut scope = tracker();
        let t0 = Instant::now();
        scope.press(t0);
        scope.release(t0 + ms(50));

        scope.touch(t0 + Duration::from_secs(20));
        assert!(!scope.check_timeout(t0 + Duration::from_secs(40)));
        assert!(scope.check_timeout(t0 + Duration::from_secs(51)));
    }

    #[test]
    fn test_reconcile_keeps_press_for_late_release() {
        let mut scope = tracker();
        let t0 = Instant::now();
        scope.press(t0);

        assert!(scope.reconcile_button(false));
        assert!(!scope.is_active());
        assert!(!scope.reconcile_button(false));

        assert_eq!(scope.release(t0 + ms(80)), ReleaseOutcome::Toggled(true));
    }

    #[test]
    fn test_configurable_threshold() {
        let mut scope = tracker();
        scope.set_tap_threshold(Duration::from_secs(1));
        let t0 = Instant::now();
        scope.press(t0);
        assert_eq!(scope.release(t0 + ms(900)), ReleaseOutcome::Toggled(true));
    }
}
