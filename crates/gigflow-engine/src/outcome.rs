//! Operation results.

use crate::events::DomainEvent;

/// Result of a successful engine operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// The operation committed and caused `events`.
    Applied { value: T, events: Vec<DomainEvent> },
    /// A replay of an operation that already took effect. Nothing changed.
    AlreadyProcessed { value: T },
}

impl<T> Outcome<T> {
    pub fn applied(value: T, events: Vec<DomainEvent>) -> Self {
        Self::Applied { value, events }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    pub fn value(&self) -> &T {
        match self {
            Self::Applied { value, .. } | Self::AlreadyProcessed { value } => value,
        }
    }

    /// Events to dispatch. Empty for replays.
    pub fn events(&self) -> &[DomainEvent] {
        match self {
            Self::Applied { events, .. } => events,
            Self::AlreadyProcessed { .. } => &[],
        }
    }

    pub fn into_parts(self) -> (T, Vec<DomainEvent>) {
        match self {
            Self::Applied { value, events } => (value, events),
            Self::AlreadyProcessed { value } => (value, Vec::new()),
        }
    }
}
