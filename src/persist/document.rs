//! The persisted document: the wire form shared by durable saves, named
//! profiles and export files.
//!
//! The document is plain camelCase JSON so exports stay readable and
//! portable across hosts. Records are separate from the store types on
//! purpose: live-only fields (stream values) stay out, and the store can
//! evolve without breaking saved documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geometry::Rect;
use crate::grid::{bump_id_counter, GridSnapshot, ItemId, Nest, NestId, Widget};
use crate::viewport::Viewport;

use super::PersistenceError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub main_items: Vec<WidgetRecord>,
    pub nest_containers: Vec<NestRecord>,
    pub nested_items: Vec<WidgetRecord>,
    pub grid_size: f64,
    pub viewport: Viewport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_saved: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetRecord {
    pub id: ItemId,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aries_mod_type: Option<String>,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nest_id: Option<NestId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NestRecord {
    pub id: NestId,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_nest_id: Option<NestId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WidgetRecord {
    fn from_widget(widget: &Widget) -> Self {
        Self {
            id: widget.id,
            x: widget.rect.loc.x,
            y: widget.rect.loc.y,
            w: widget.rect.size.w,
            h: widget.rect.size.h,
            title: widget.title.clone(),
            kind: widget.kind.clone(),
            aries_mod_type: widget.module.clone(),
            config: widget.config.clone(),
            stream: widget.stream.clone(),
            nest_id: widget.nest,
            created_at: widget.created_at,
            updated_at: widget.updated_at,
        }
    }

    fn into_widget(self) -> Widget {
        Widget {
            id: self.id,
            rect: Rect::new(self.x, self.y, self.w, self.h),
            title: self.title,
            kind: self.kind,
            module: self.aries_mod_type,
            config: self.config,
            stream: self.stream,
            data: None,
            nest: self.nest_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl NestRecord {
    fn from_nest(nest: &Nest) -> Self {
        Self {
            id: nest.id,
            x: nest.rect.loc.x,
            y: nest.rect.loc.y,
            w: nest.rect.size.w,
            h: nest.rect.size.h,
            title: nest.title.clone(),
            parent_nest_id: nest.parent,
            created_at: nest.created_at,
            updated_at: nest.updated_at,
        }
    }

    fn into_nest(self) -> Nest {
        Nest {
            id: self.id,
            rect: Rect::new(self.x, self.y, self.w, self.h),
            title: self.title,
            parent: self.parent_nest_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl Document {
    pub fn from_snapshot(snapshot: &GridSnapshot, grid_size: f64) -> Self {
        let main_items = snapshot
            .widgets
            .iter()
            .filter(|widget| widget.nest.is_none())
            .map(WidgetRecord::from_widget)
            .collect();
        let nested_items = snapshot
            .widgets
            .iter()
            .filter(|widget| widget.nest.is_some())
            .map(WidgetRecord::from_widget)
            .collect();
        let nest_containers = snapshot.nests.iter().map(NestRecord::from_nest).collect();

        Self {
            main_items,
            nest_containers,
            nested_items,
            grid_size,
            viewport: snapshot.viewport,
            last_saved: None,
            exported_at: None,
        }
    }

    /// Rebuilds the in-memory snapshot, rejecting inconsistent documents and
    /// bumping the id counter so new items can't collide with imported ones.
    pub fn into_snapshot(self) -> Result<GridSnapshot, PersistenceError> {
        let nests: Vec<Nest> = self
            .nest_containers
            .into_iter()
            .map(NestRecord::into_nest)
            .collect();
        let widgets: Vec<Widget> = self
            .main_items
            .into_iter()
            .chain(self.nested_items)
            .map(WidgetRecord::into_widget)
            .collect();

        let mut max_id = 0;
        for nest in &nests {
            if let Some(parent) = nest.parent {
                if !nests.iter().any(|other| other.id == parent) {
                    return Err(PersistenceError::InvalidDocument(format!(
                        "nest {} references missing parent {parent}",
                        nest.id
                    )));
                }
            }
            if nest.rect.size.w <= 0. || nest.rect.size.h <= 0. {
                return Err(PersistenceError::InvalidDocument(format!(
                    "nest {} has a degenerate size",
                    nest.id
                )));
            }
            max_id = max_id.max(nest.id.get());
        }
        for widget in &widgets {
            if let Some(nest) = widget.nest {
                if !nests.iter().any(|other| other.id == nest) {
                    return Err(PersistenceError::InvalidDocument(format!(
                        "widget {} references missing nest {nest}",
                        widget.id
                    )));
                }
            }
            if widget.rect.size.w <= 0. || widget.rect.size.h <= 0. {
                return Err(PersistenceError::InvalidDocument(format!(
                    "widget {} has a degenerate size",
                    widget.id
                )));
            }
            max_id = max_id.max(widget.id.get());
        }

        bump_id_counter(max_id);

        Ok(GridSnapshot {
            viewport: self.viewport,
            widgets,
            nests,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, PersistenceError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, PersistenceError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::grid::GridState;
    use crate::Options;

    fn sample_snapshot() -> GridSnapshot {
        let mut state = GridState::new(Rc::new(Options::default()));
        let nest = state
            .add_nest(Nest::new(Rect::new(300., 300., 400., 300.), "nest"))
            .unwrap();
        state
            .add_widget(Widget::new(Rect::new(0., 0., 100., 100.), "free", "chart"))
            .unwrap();
        let mut nested = Widget::new(Rect::new(20., 20., 100., 80.), "nested", "sensor");
        nested.nest = Some(nest);
        nested.stream = Some("sensors.temp".into());
        state.add_widget(nested).unwrap();
        state.snapshot()
    }

    #[test]
    fn round_trip_preserves_collections() {
        let snapshot = sample_snapshot();

        let doc = Document::from_snapshot(&snapshot, 20.);
        let bytes = doc.encode().unwrap();
        let restored = Document::decode(&bytes).unwrap().into_snapshot().unwrap();

        // Widgets come back main-first, matching the original insertion
        // order here.
        assert_eq!(restored.widgets, snapshot.widgets);
        assert_eq!(restored.nests, snapshot.nests);
        assert_eq!(restored.viewport, snapshot.viewport);
    }

    #[test]
    fn wire_format_is_camel_case() {
        let snapshot = sample_snapshot();
        let doc = Document::from_snapshot(&snapshot, 20.);
        let json: serde_json::Value =
            serde_json::from_slice(&doc.encode().unwrap()).unwrap();

        assert!(json.get("mainItems").is_some());
        assert!(json.get("nestContainers").is_some());
        assert!(json.get("nestedItems").is_some());
        assert!(json.get("gridSize").is_some());
        let nested = &json["nestedItems"][0];
        assert!(nested.get("nestId").is_some());
        assert!(nested.get("createdAt").is_some());
    }

    #[test]
    fn dangling_nest_reference_is_rejected() {
        let snapshot = sample_snapshot();
        let mut doc = Document::from_snapshot(&snapshot, 20.);
        doc.nest_containers.clear();

        let result = doc.into_snapshot();
        assert!(matches!(result, Err(PersistenceError::InvalidDocument(_))));
    }

    #[test]
    fn import_bumps_the_id_counter() {
        let snapshot = sample_snapshot();
        let max_seen = snapshot
            .widgets
            .iter()
            .map(|w| w.id.get())
            .chain(snapshot.nests.iter().map(|n| n.id.get()))
            .max()
            .unwrap();

        let doc = Document::from_snapshot(&snapshot, 20.);
        doc.into_snapshot().unwrap();

        assert!(ItemId::next().get() > max_seen);
    }
}
