//! Property tests for the stall supervisor's state machine.

use proptest::prelude::*;

use spvrelay_node::{StallState, StallTracker, SupervisorAction};

proptest! {
    /// Strictly rising heights never trigger any maintenance.
    #[test]
    fn rising_heights_stay_healthy(start in 0u32..1_000_000, steps in prop::collection::vec(1u32..100, 1..50)) {
        let mut tracker = StallTracker::new(start);
        let mut height = start;
        for step in steps {
            height += step;
            let t = tracker.observe(height);
            prop_assert_eq!(t.state, StallState::Healthy);
            prop_assert_eq!(t.action, SupervisorAction::None);
        }
    }

    /// Every rollback is preceded by a resync-only stall on the sample
    /// before it, so an episode rolls back at most once.
    #[test]
    fn rollback_always_follows_a_plain_resync(heights in prop::collection::vec(0u32..20, 1..100)) {
        let mut tracker = StallTracker::new(0);
        let mut previous = SupervisorAction::None;
        for h in heights {
            let t = tracker.observe(h);
            if t.action == SupervisorAction::RollbackAndResync {
                prop_assert_eq!(previous, SupervisorAction::Resync);
            }
            previous = t.action;
        }
    }
}
