//! Command sequences
//!
//! A [`CommandSequence`] is the unit of work handed to the task manager: an
//! ordered list of actions against one site plus a completion callback. It is
//! built once per site, consumed by exactly one worker, and never reused.

mod action;

pub use action::{Action, ActionKind, ActionSpec};

use crate::site::Site;
use std::fmt;

/// Callback invoked once with the sequence outcome
///
/// Runs synchronously on the worker that executed the sequence, so it must
/// return quickly.
pub type CompletionCallback = Box<dyn FnOnce(bool) + Send + 'static>;

/// Ordered actions against one site, plus a completion callback
pub struct CommandSequence {
    site: Site,
    actions: Vec<Action>,
    callback: Option<CompletionCallback>,
}

impl CommandSequence {
    /// Creates an empty sequence with no callback
    pub fn new(site: Site) -> Self {
        Self {
            site,
            actions: Vec::new(),
            callback: None,
        }
    }

    /// Appends an action to the end of the sequence
    pub fn append(&mut self, action: Action) {
        self.actions.push(action);
    }

    /// Sets the completion callback, replacing any previous one
    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(bool) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub(crate) fn into_parts(self) -> (Site, Vec<Action>, Option<CompletionCallback>) {
        (self.site, self.actions, self.callback)
    }
}

impl fmt::Debug for CommandSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSequence")
            .field("site", &self.site)
            .field("actions", &self.actions)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// Builds the command sequence for one site
///
/// Every action template is instantiated against the site's URL, in order. An empty
/// `specs` slice yields a sequence that succeeds as soon as it is run.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use sitevisit::{build_sequence, ActionSpec, SiteRegistry};
///
/// let registry = SiteRegistry::new(["https://example.com"]).unwrap();
/// let site = registry.get(0).unwrap().clone();
/// let spec = ActionSpec::fetch(Duration::from_secs(3), Duration::from_secs(60));
///
/// let sequence = build_sequence(site, &[spec], |success| {
///     println!("visit finished: {}", success);
/// });
/// assert_eq!(sequence.actions().len(), 1);
/// ```
pub fn build_sequence<F>(site: Site, specs: &[ActionSpec], callback: F) -> CommandSequence
where
    F: FnOnce(bool) + Send + 'static,
{
    let mut sequence = CommandSequence::new(site);
    for spec in specs {
        let action = spec.instantiate(sequence.site.url());
        sequence.append(action);
    }
    sequence.on_complete(callback)
}
