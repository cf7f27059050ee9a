//! Items that live on the grid: widgets and nest containers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geometry::Rect;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_raw_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Makes sure freshly generated ids stay above everything in an imported
/// document.
pub(crate) fn bump_id_counter(max_seen: u64) {
    NEXT_ID.fetch_max(max_seen + 1, Ordering::Relaxed);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl ItemId {
    pub fn next() -> Self {
        Self(next_raw_id())
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NestId(pub u64);

impl NestId {
    pub fn next() -> Self {
        Self(next_raw_id())
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Either kind of grid item, for operations that apply to both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemRef {
    Widget(ItemId),
    Nest(NestId),
}

impl ItemRef {
    /// Raw id, used to order mixed widget/nest sibling sets deterministically.
    pub fn raw(self) -> u64 {
        match self {
            ItemRef::Widget(id) => id.get(),
            ItemRef::Nest(id) => id.get(),
        }
    }
}

/// A dashboard widget: a sensor display, chart, simulation, or anything else
/// the host renders. The engine only owns its geometry and container
/// membership; `kind`, `config` and `data` are opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    pub id: ItemId,
    /// Top-left plus size, in the owning container's coordinate space: world
    /// units on the main grid, content-relative units inside a nest.
    pub rect: Rect,
    pub title: String,
    /// Widget type tag from the palette, opaque to the engine.
    pub kind: String,
    /// Hardware module binding, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    /// Presentation configuration, opaque to the engine.
    #[serde(default)]
    pub config: serde_json::Value,
    /// Live data stream this widget is bound to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
    /// Latest live value routed in via the stream binding. Not persisted.
    #[serde(skip)]
    pub data: Option<serde_json::Value>,
    /// Owning nest, or `None` for the main grid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nest: Option<NestId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Widget {
    pub fn new(rect: Rect, title: impl Into<String>, kind: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ItemId::next(),
            rect,
            title: title.into(),
            kind: kind.into(),
            module: None,
            config: serde_json::Value::Null,
            stream: None,
            data: None,
            nest: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A movable, resizable container owning a local coordinate space for child
/// widgets and, possibly, child nests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nest {
    pub id: NestId,
    /// In the owning container's coordinate space, like [`Widget::rect`].
    pub rect: Rect,
    pub title: String,
    /// Parent nest, or `None` when the nest sits on the main grid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<NestId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Nest {
    pub fn new(rect: Rect, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: NestId::next(),
            rect,
            title: title.into(),
            parent: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_increasing() {
        let a = ItemId::next();
        let b = NestId::next();
        let c = ItemId::next();

        assert!(a.get() < b.get());
        assert!(b.get() < c.get());
    }

    #[test]
    fn bump_keeps_fresh_ids_above_imported_ones() {
        let seen = ItemId::next().get() + 1000;
        bump_id_counter(seen);
        assert!(ItemId::next().get() > seen);
    }
}
