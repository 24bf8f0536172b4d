//! Control actions that drive a job transition.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Externally triggered control signal.
///
/// Actions come from users or a higher-level controller; they are never
/// derived from status. `Reconcile` is the default (no explicit action).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "ActionRepr")]
pub enum Action {
    /// Kill all tasks and start the job over.
    Restart,

    /// Kill all tasks and park the job in `Aborted`.
    Abort,

    /// Kill all tasks and mark the job `Completed`.
    Complete,

    /// Kill all tasks and mark the job `Terminated`.
    Terminate,

    /// Bring an aborted job back through `Restarting`.
    Resume,

    /// Plain reconciliation. Unknown actions are read as this.
    #[default]
    Reconcile,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Restart => "restart",
            Action::Abort => "abort",
            Action::Complete => "complete",
            Action::Terminate => "terminate",
            Action::Resume => "resume",
            Action::Reconcile => "reconcile",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsing never fails: an unrecognized action is plain reconciliation.
impl From<&str> for Action {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "restart" => Action::Restart,
            "abort" => Action::Abort,
            "complete" => Action::Complete,
            "terminate" => Action::Terminate,
            "resume" => Action::Resume,
            "reconcile" | "" => Action::Reconcile,
            other => {
                tracing::debug!(action = other, "unknown action, treating as reconcile");
                Action::Reconcile
            }
        }
    }
}

impl From<String> for Action {
    fn from(s: String) -> Self {
        Action::from(s.as_str())
    }
}

/// Wire form accepted for an action: a name, or any other value.
#[derive(Deserialize)]
#[serde(untagged)]
enum ActionRepr {
    Name(String),
    Other(serde::de::IgnoredAny),
}

impl From<ActionRepr> for Action {
    fn from(repr: ActionRepr) -> Self {
        match repr {
            ActionRepr::Name(name) => Action::from(name),
            ActionRepr::Other(_) => {
                tracing::debug!("non-string action, treating as reconcile");
                Action::Reconcile
            }
        }
    }
}

impl FromStr for Action {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Action::from(s))
    }
}
