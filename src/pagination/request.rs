use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::cursor::Cursor;
use crate::types::SortKey;

/// Sort direction. On the wire this is `1` (ascending) or `-1` (descending).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Order {
    Ascending,
    /// Newest first, the natural order of a feed.
    #[default]
    Descending,
}

impl Order {
    pub fn reverse(self) -> Self {
        match self {
            Order::Ascending => Order::Descending,
            Order::Descending => Order::Ascending,
        }
    }

    /// Whether `a` comes strictly before `b` in this order.
    pub fn precedes(self, a: SortKey, b: SortKey) -> bool {
        match self {
            Order::Ascending => a < b,
            Order::Descending => a > b,
        }
    }

    /// Apply this direction to an ascending comparison.
    pub fn apply(self, ascending: Ordering) -> Ordering {
        match self {
            Order::Ascending => ascending,
            Order::Descending => ascending.reverse(),
        }
    }
}

impl TryFrom<i64> for Order {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Order::Ascending),
            -1 => Ok(Order::Descending),
            other => Err(format!("order must be 1 or -1, got {}", other)),
        }
    }
}

impl From<Order> for i64 {
    fn from(order: Order) -> Self {
        match order {
            Order::Ascending => 1,
            Order::Descending => -1,
        }
    }
}

/// Which end of the ordered collection a window grows from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// `first`: the window starts after `after` and runs along the order.
    Forward,
    /// `last`: the window ends before `before`.
    Backward,
}

/// A caller's pagination arguments, exactly as received.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default)]
    pub first: Option<usize>,
    #[serde(default)]
    pub last: Option<usize>,
    #[serde(default)]
    pub before: Option<Cursor>,
    #[serde(default)]
    pub after: Option<Cursor>,
    #[serde(default)]
    pub order: Order,
}

impl PageRequest {
    pub fn first(n: usize) -> Self {
        Self {
            first: Some(n),
            ..Self::default()
        }
    }

    pub fn last(n: usize) -> Self {
        Self {
            last: Some(n),
            ..Self::default()
        }
    }

    pub fn with_order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub fn with_after(mut self, cursor: Cursor) -> Self {
        self.after = Some(cursor);
        self
    }

    pub fn with_before(mut self, cursor: Cursor) -> Self {
        self.before = Some(cursor);
        self
    }

    /// Resolve the window direction and size. `first` wins when both are
    /// set; neither falls back to `default_size`. Sizes are clamped to
    /// `max_size`.
    pub fn window(&self, default_size: usize, max_size: usize) -> (Direction, usize) {
        let (direction, size) = match (self.first, self.last) {
            (Some(n), _) => (Direction::Forward, n),
            (None, Some(n)) => (Direction::Backward, n),
            (None, None) => (Direction::Forward, default_size),
        };
        (direction, size.min(max_size))
    }
}
