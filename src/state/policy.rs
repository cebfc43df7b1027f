//! Hold policy: either trigger held, and the scope is not active

use crate::input::TriggerState;

/// Decide whether the output key should be held this tick
pub fn should_hold(triggers: TriggerState, scope_active: bool) -> bool {
    triggers.any() && !scope_active
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truth_table() {
        for a in [false, true] {
            for b in [false, true] {
                for scope in [false, true] {
                    let expected = (a || b) && !scope;
                    assert_eq!(
                        should_hold(TriggerState { a, b }, scope),
                        expected,
                        "a={a} b={b} scope={scope}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_scope_suppresses_both_triggers() {
        assert!(!should_hold(TriggerState { a: true, b: true }, true));
    }
}
