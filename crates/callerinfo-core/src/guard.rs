//! Double-injection guard
//!
//! A matched call that directly follows a `put` of the configured key was
//! already instrumented, so it must not be wrapped again. The guard only ever
//! looks at the previous call.

/// How the rewriter classified a call instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Matches a target pattern
    Matched,
    /// Context-store `put` whose first literal was the configured key
    GuardPut,
    /// Anything else
    Other,
}

/// Guard state between two calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GuardState {
    /// The next matched call gets wrapped
    #[default]
    Idle,
    /// The previous call stored the key; the next matched call is left alone
    JustSawGuardPut,
}

impl GuardState {
    /// Whether a matched call in this state gets wrapped
    pub fn injects(self) -> bool {
        self == GuardState::Idle
    }

    /// State after a call of `kind`
    pub fn next(self, kind: CallKind) -> GuardState {
        match (self, kind) {
            (_, CallKind::GuardPut) => GuardState::JustSawGuardPut,
            (GuardState::Idle, CallKind::Matched) => GuardState::Idle,
            (GuardState::JustSawGuardPut, CallKind::Matched) => GuardState::Idle,
            (_, CallKind::Other) => GuardState::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use CallKind::*;
        use GuardState::*;

        let table = [
            (Idle, Matched, Idle),
            (Idle, GuardPut, JustSawGuardPut),
            (Idle, Other, Idle),
            (JustSawGuardPut, Matched, Idle),
            (JustSawGuardPut, GuardPut, JustSawGuardPut),
            (JustSawGuardPut, Other, Idle),
        ];
        for (state, kind, expected) in table {
            assert_eq!(state.next(kind), expected, "{state:?} + {kind:?}");
        }
    }

    #[test]
    fn test_guard_suppresses_one_call() {
        let state = GuardState::default().next(CallKind::GuardPut);
        assert!(!state.injects());

        let state = state.next(CallKind::Matched);
        assert!(state.injects());
    }
}
