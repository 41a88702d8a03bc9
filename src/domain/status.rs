//! Status machines shared by every entity
//!
//! Each entity declares its statuses as an enum implementing [`Status`] and
//! its legal moves as `const` [`Transition`]s. The store applies a transition
//! only when the current row status is in the transition's `from` set.

use std::fmt;

/// A status enum backing one entity table.
pub trait Status: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    /// Entity name used in errors and event types ("quote", "invoice", ...)
    const ENTITY: &'static str;

    /// Database / wire representation
    fn as_str(&self) -> &'static str;

    /// Parse the database / wire representation
    fn parse(s: &str) -> Option<Self>;
}

/// One allowed move in an entity's status machine.
#[derive(Debug, Clone, Copy)]
pub struct Transition<S: 'static> {
    pub action: &'static str,
    pub from: &'static [S],
    pub to: S,
    /// Event emitted when the transition succeeds
    pub event_type: &'static str,
}

impl<S: Status> Transition<S> {
    /// Check if this transition may start from `current`.
    pub fn allows(&self, current: S) -> bool {
        self.from.contains(&current)
    }

    /// Source statuses as their string forms, for SQL `IN (...)` lists.
    pub fn from_strs(&self) -> Vec<&'static str> {
        self.from.iter().map(|s| s.as_str()).collect()
    }
}
