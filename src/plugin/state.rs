//! Plugin lifecycle states and the legal transitions between them.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{ErrorCode, PluginError, PluginResult};

/// Lifecycle position of a registered plugin.
///
/// ```text
/// uninitialized → initializing → initialized → starting → started
///                                                  ↑           ↓
///                                               stopped ← stopping
///                                                  ↓
///                                              destroyed
/// ```
///
/// `error` is reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginState {
    Uninitialized,
    Initializing,
    Initialized,
    Starting,
    Started,
    Stopping,
    Stopped,
    Destroyed,
    Error,
}

impl PluginState {
    pub fn all() -> &'static [PluginState] {
        &[
            PluginState::Uninitialized,
            PluginState::Initializing,
            PluginState::Initialized,
            PluginState::Starting,
            PluginState::Started,
            PluginState::Stopping,
            PluginState::Stopped,
            PluginState::Destroyed,
            PluginState::Error,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PluginState::Uninitialized => "uninitialized",
            PluginState::Initializing => "initializing",
            PluginState::Initialized => "initialized",
            PluginState::Starting => "starting",
            PluginState::Started => "started",
            PluginState::Stopping => "stopping",
            PluginState::Stopped => "stopped",
            PluginState::Destroyed => "destroyed",
            PluginState::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PluginState::Destroyed | PluginState::Error)
    }

    /// States in which a hook is currently running.
    pub fn is_transitional(&self) -> bool {
        matches!(
            self,
            PluginState::Initializing | PluginState::Starting | PluginState::Stopping
        )
    }

    pub fn can_transition_to(&self, next: PluginState) -> bool {
        use PluginState::*;

        if next == Error {
            return !self.is_terminal();
        }

        matches!(
            (self, next),
            (Uninitialized, Initializing)
                | (Initializing, Initialized)
                | (Initialized, Starting)
                | (Starting, Started)
                | (Started, Stopping)
                | (Stopping, Stopped)
                | (Stopped, Starting)
                // teardown edges used by unregister/dispose
                | (Uninitialized, Destroyed)
                | (Initialized, Destroyed)
                | (Stopped, Destroyed)
                | (Error, Destroyed)
        )
    }
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transition guard with a short history for diagnostics.
#[derive(Debug, Clone)]
pub struct LifecycleStateMachine {
    current: PluginState,
    history: Vec<(PluginState, PluginState)>,
}

const HISTORY_LIMIT: usize = 32;

impl Default for LifecycleStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleStateMachine {
    pub fn new() -> Self {
        Self {
            current: PluginState::Uninitialized,
            history: Vec::new(),
        }
    }

    pub fn current(&self) -> PluginState {
        self.current
    }

    pub fn history(&self) -> &[(PluginState, PluginState)] {
        &self.history
    }

    /// Moves to `next`, returning the previous state.
    pub fn transition(&mut self, plugin_id: &str, next: PluginState) -> PluginResult<PluginState> {
        let from = self.current;
        if !from.can_transition_to(next) {
            return Err(PluginError::runtime(
                plugin_id,
                ErrorCode::InvalidState,
                format!("illegal state transition {} -> {}", from, next),
            )
            .with_context(serde_json::json!({
                "from": from,
                "to": next,
            })));
        }

        self.current = next;
        if self.history.len() == HISTORY_LIMIT {
            self.history.remove(0);
        }
        self.history.push((from, next));
        Ok(from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PluginState::*;

    #[test]
    fn test_happy_path() {
        let mut sm = LifecycleStateMachine::new();
        for next in [Initializing, Initialized, Starting, Started, Stopping, Stopped] {
            sm.transition("p", next).unwrap();
        }
        assert_eq!(sm.current(), Stopped);
        assert_eq!(sm.history().len(), 6);

        sm.transition("p", Starting).unwrap();
        sm.transition("p", Started).unwrap();
        assert_eq!(sm.current(), Started);
    }

    #[test]
    fn test_illegal_transition() {
        let mut sm = LifecycleStateMachine::new();
        let err = sm.transition("p", Started).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidState);
        assert_eq!(sm.current(), Uninitialized);
    }

    #[test]
    fn test_error_reachable_from_non_terminal() {
        for state in PluginState::all() {
            assert_eq!(state.can_transition_to(Error), !state.is_terminal());
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(!Destroyed.can_transition_to(Starting));
        assert!(!Error.can_transition_to(Starting));
        assert!(Error.can_transition_to(Destroyed));
        assert!(!Started.can_transition_to(Destroyed));
    }

    #[test]
    fn test_history_is_bounded() {
        let mut sm = LifecycleStateMachine::new();
        sm.transition("p", Initializing).unwrap();
        sm.transition("p", Initialized).unwrap();
        for _ in 0..40 {
            sm.transition("p", Starting).unwrap();
            sm.transition("p", Started).unwrap();
            sm.transition("p", Stopping).unwrap();
            sm.transition("p", Stopped).unwrap();
        }
        assert_eq!(sm.history().len(), HISTORY_LIMIT);
    }
}
