//! Listener priorities.
//!
//! Every listener is registered at one of five fixed priority levels. When an
//! event is posted, all `Highest` listeners run first, then `High`, and so on
//! down to `Lowest`. Within one level the more specific event kind runs first,
//! then registration order decides.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::EventBusError;

/// Priority levels for listeners.
///
/// Higher priority listeners run before lower priority ones. The declaration
/// order of the variants is the execution order.
///
/// # Examples
///
/// ```rust
/// use eventbus::EventPriority;
///
/// assert!(EventPriority::Highest > EventPriority::Normal);
/// assert_eq!(EventPriority::ALL[0], EventPriority::Highest);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum EventPriority {
    /// Runs first. Reserved for listeners that must see the event before
    /// anyone else can change or cancel it.
    Highest,
    /// Runs after `Highest`.
    High,
    /// The default priority.
    Normal,
    /// Runs after `Normal`.
    Low,
    /// Runs last. Useful for listeners that only observe the final outcome.
    Lowest,
}

impl EventPriority {
    /// All priorities, in execution order.
    pub const ALL: [EventPriority; 5] = [
        EventPriority::Highest,
        EventPriority::High,
        EventPriority::Normal,
        EventPriority::Low,
        EventPriority::Lowest,
    ];

    /// Number of priority levels.
    pub const COUNT: usize = Self::ALL.len();

    /// Position of this priority in execution order, `0` for `Highest`.
    pub const fn ordinal(self) -> usize {
        match self {
            EventPriority::Highest => 0,
            EventPriority::High => 1,
            EventPriority::Normal => 2,
            EventPriority::Low => 3,
            EventPriority::Lowest => 4,
        }
    }

    /// Returns whether listeners at this priority run before listeners at `other`.
    ///
    /// ```rust
    /// use eventbus::EventPriority;
    ///
    /// assert!(EventPriority::High.is_higher_than(EventPriority::Low));
    /// assert!(!EventPriority::Lowest.is_higher_than(EventPriority::Lowest));
    /// ```
    pub const fn is_higher_than(self, other: EventPriority) -> bool {
        self.ordinal() < other.ordinal()
    }

    /// Returns the upper-case name of this priority, as used in diagnostics.
    pub const fn name(self) -> &'static str {
        match self {
            EventPriority::Highest => "HIGHEST",
            EventPriority::High => "HIGH",
            EventPriority::Normal => "NORMAL",
            EventPriority::Low => "LOW",
            EventPriority::Lowest => "LOWEST",
        }
    }
}

impl Default for EventPriority {
    fn default() -> Self {
        EventPriority::Normal
    }
}

impl PartialOrd for EventPriority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventPriority {
    fn cmp(&self, other: &Self) -> Ordering {
        // Lower ordinal runs earlier and therefore compares greater.
        other.ordinal().cmp(&self.ordinal())
    }
}

impl fmt::Display for EventPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EventPriority {
    type Err = EventBusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventPriority::ALL
            .into_iter()
            .find(|priority| priority.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| EventBusError::configuration(format!("unknown event priority `{s}`")))
    }
}
