// crates/core/src/projector.rs
//! Live-ticking elapsed time between authoritative progress updates.

use std::time::Instant;

/// Extrapolates `display_seconds` from the last authoritative elapsed value.
///
/// `display = base + floor((now - anchor) / 1s)`, and the displayed value
/// never moves backwards: a late authoritative update that is smaller than
/// what is already on screen holds the display until the clock catches up.
#[derive(Debug, Clone, Default)]
pub struct ElapsedProjector {
    base_seconds: u64,
    anchor: Option<Instant>,
    display_seconds: u64,
    frozen: bool,
}

impl ElapsedProjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new authoritative elapsed value observed at `now`.
    ///
    /// Only a changed value re-anchors the clock; re-anchoring on every
    /// identical update would stall the display under a steady event rate.
    pub fn update(&mut self, authoritative: u64, now: Instant) {
        if self.frozen {
            return;
        }
        if self.anchor.is_some() && authoritative == self.base_seconds {
            return;
        }
        self.base_seconds = authoritative;
        self.anchor = Some(now);
        self.display_seconds = self.display_seconds.max(authoritative);
    }

    /// Advance the display to `now` and return it.
    pub fn tick(&mut self, now: Instant) -> u64 {
        if self.frozen {
            return self.display_seconds;
        }
        if let Some(anchor) = self.anchor {
            let since = now.saturating_duration_since(anchor).as_secs();
            let projected = self.base_seconds.saturating_add(since);
            self.display_seconds = self.display_seconds.max(projected);
        }
        self.display_seconds
    }

    /// Stop ticking at the final authoritative value. Idempotent.
    pub fn freeze(&mut self, authoritative: u64) {
        if self.frozen {
            return;
        }
        self.display_seconds = self.display_seconds.max(authoritative);
        self.frozen = true;
    }

    pub fn display_seconds(&self) -> u64 {
        self.display_seconds
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Whether an authoritative value has been recorded yet.
    pub fn is_anchored(&self) -> bool {
        self.anchor.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_unanchored_projector_shows_zero() {
        let mut projector = ElapsedProjector::new();
        assert_eq!(projector.tick(Instant::now()), 0);
        assert!(!projector.is_anchored());
    }

    #[test]
    fn test_ticks_forward_from_base() {
        let start = Instant::now();
        let mut projector = ElapsedProjector::new();
        projector.update(12, start);

        assert_eq!(projector.tick(start), 12);
        assert_eq!(projector.tick(start + Duration::from_millis(999)), 12);
        assert_eq!(projector.tick(start + Duration::from_millis(1000)), 13);
        assert_eq!(projector.tick(start + Duration::from_secs(5)), 17);
    }

    #[test]
    fn test_new_authoritative_value_reanchors() {
        let start = Instant::now();
        let mut projector = ElapsedProjector::new();
        projector.update(10, start);
        projector.tick(start + Duration::from_secs(3));

        projector.update(20, start + Duration::from_secs(3));
        assert_eq!(projector.tick(start + Duration::from_secs(4)), 21);
    }

    #[test]
    fn test_smaller_authoritative_value_never_moves_display_back() {
        let start = Instant::now();
        let mut projector = ElapsedProjector::new();
        projector.update(10, start);
        assert_eq!(projector.tick(start + Duration::from_secs(5)), 15);

        // Server says 13 at t=5: display holds at 15 until 13 + 2s.
        projector.update(13, start + Duration::from_secs(5));
        assert_eq!(projector.tick(start + Duration::from_secs(6)), 15);
        assert_eq!(projector.tick(start + Duration::from_secs(7)), 15);
        assert_eq!(projector.tick(start + Duration::from_secs(8)), 16);
    }

    #[test]
    fn test_identical_updates_do_not_stall_the_clock() {
        let start = Instant::now();
        let mut projector = ElapsedProjector::new();
        projector.update(0, start);
        for ms in (0..3000).step_by(400) {
            projector.update(0, start + Duration::from_millis(ms));
        }
        assert_eq!(projector.tick(start + Duration::from_secs(3)), 3);
    }

    #[test]
    fn test_frozen_projector_stops_ticking() {
        let start = Instant::now();
        let mut projector = ElapsedProjector::new();
        projector.update(30, start);
        projector.freeze(42);
        assert!(projector.is_frozen());

        for secs in 1..=10 {
            assert_eq!(projector.tick(start + Duration::from_secs(secs * 60)), 42);
        }

        projector.update(100, start);
        projector.freeze(200);
        assert_eq!(projector.display_seconds(), 42);
    }
}
