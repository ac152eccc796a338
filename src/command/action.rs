use crate::config::VisitSection;
use std::fmt;
use std::time::Duration;
use url::Url;

/// The kinds of action a worker can execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// Load the target, then idle on it for the action's sleep period
    Fetch,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single step of a command sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub kind: ActionKind,
    pub target: Url,
    /// Idle period after the target loads; counts against `timeout`
    pub sleep_after: Duration,
    /// Upper bound on the whole action, load and idle included
    pub timeout: Duration,
}

impl Action {
    /// Creates a fetch action
    pub fn fetch(target: Url, sleep_after: Duration, timeout: Duration) -> Self {
        Self {
            kind: ActionKind::Fetch,
            target,
            sleep_after,
            timeout,
        }
    }
}

/// Template for an action, instantiated against each site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionSpec {
    pub kind: ActionKind,
    pub sleep_after: Duration,
    pub timeout: Duration,
}

impl ActionSpec {
    /// Template for a fetch action
    pub fn fetch(sleep_after: Duration, timeout: Duration) -> Self {
        Self {
            kind: ActionKind::Fetch,
            sleep_after,
            timeout,
        }
    }

    /// Instantiates this template against a target URL
    pub fn instantiate(&self, target: &Url) -> Action {
        Action {
            kind: self.kind,
            target: target.clone(),
            sleep_after: self.sleep_after,
            timeout: self.timeout,
        }
    }
}

impl From<&VisitSection> for ActionSpec {
    fn from(section: &VisitSection) -> Self {
        Self::fetch(
            Duration::from_secs(section.sleep_secs),
            Duration::from_secs(section.timeout_secs),
        )
    }
}
