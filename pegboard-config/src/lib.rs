//! Declarative configuration for the pegboard engine.
//!
//! The config is a KDL document. Every section is optional and falls back to
//! its defaults, so an empty document is a valid config:
//!
//! ```kdl
//! grid {
//!     size 20.0
//!     min-widget-size 60.0 40.0
//!     min-nest-size 200.0 150.0
//!     nest-header-height 40.0
//!     nest-margin 20.0
//! }
//! zoom {
//!     min 0.1
//!     max 3.0
//!     wheel-step 1.2
//! }
//! history {
//!     capacity 50
//!     debounce-ms 100
//! }
//! autosave {
//!     interval-ms 5000
//!     max-retries 3
//! }
//! culling {
//!     buffer 200.0
//! }
//! interaction {
//!     pointer-throttle-ms 8
//! }
//! ```

use std::path::Path;

use miette::{miette, IntoDiagnostic, WrapErr};

#[derive(knuffel::Decode, Debug, Clone, PartialEq)]
pub struct Config {
    #[knuffel(child, default)]
    pub grid: Grid,
    #[knuffel(child, default)]
    pub zoom: Zoom,
    #[knuffel(child, default)]
    pub history: History,
    #[knuffel(child, default)]
    pub autosave: Autosave,
    #[knuffel(child, default)]
    pub culling: Culling,
    #[knuffel(child, default)]
    pub interaction: Interaction,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            grid: Grid::default(),
            zoom: Zoom::default(),
            history: History::default(),
            autosave: Autosave::default(),
            culling: Culling::default(),
            interaction: Interaction::default(),
        }
    }
}

#[derive(knuffel::Decode, Debug, Clone, PartialEq)]
pub struct Grid {
    /// Snap step in world units.
    #[knuffel(child, unwrap(argument), default = Self::default().size)]
    pub size: f64,
    #[knuffel(child, default = Self::default().min_widget_size)]
    pub min_widget_size: SizePair,
    #[knuffel(child, default = Self::default().min_nest_size)]
    pub min_nest_size: SizePair,
    /// Height of the title bar at the top of a nest container.
    ///
    /// Child coordinates are relative to the container origin shifted down by
    /// this much.
    #[knuffel(child, unwrap(argument), default = Self::default().nest_header_height)]
    pub nest_header_height: f64,
    #[knuffel(child, unwrap(argument), default = Self::default().nest_margin)]
    pub nest_margin: f64,
}

impl Default for Grid {
    fn default() -> Self {
        Self {
            size: 20.,
            min_widget_size: SizePair { w: 60., h: 40. },
            min_nest_size: SizePair { w: 200., h: 150. },
            nest_header_height: 40.,
            nest_margin: 20.,
        }
    }
}

#[derive(knuffel::Decode, Debug, Clone, Copy, PartialEq)]
pub struct SizePair {
    #[knuffel(argument)]
    pub w: f64,
    #[knuffel(argument)]
    pub h: f64,
}

#[derive(knuffel::Decode, Debug, Clone, PartialEq)]
pub struct Zoom {
    #[knuffel(child, unwrap(argument), default = Self::default().min)]
    pub min: f64,
    #[knuffel(child, unwrap(argument), default = Self::default().max)]
    pub max: f64,
    /// Multiplier applied per wheel detent.
    #[knuffel(child, unwrap(argument), default = Self::default().wheel_step)]
    pub wheel_step: f64,
}

impl Default for Zoom {
    fn default() -> Self {
        Self {
            min: 0.1,
            max: 3.0,
            wheel_step: 1.2,
        }
    }
}

#[derive(knuffel::Decode, Debug, Clone, PartialEq)]
pub struct History {
    #[knuffel(child, unwrap(argument), default = Self::default().capacity)]
    pub capacity: usize,
    #[knuffel(child, unwrap(argument), default = Self::default().debounce_ms)]
    pub debounce_ms: u64,
}

impl Default for History {
    fn default() -> Self {
        Self {
            capacity: 50,
            debounce_ms: 100,
        }
    }
}

#[derive(knuffel::Decode, Debug, Clone, PartialEq)]
pub struct Autosave {
    #[knuffel(child, unwrap(argument), default = Self::default().interval_ms)]
    pub interval_ms: u64,
    #[knuffel(child, unwrap(argument), default = Self::default().max_retries)]
    pub max_retries: u32,
}

impl Default for Autosave {
    fn default() -> Self {
        Self {
            interval_ms: 5000,
            max_retries: 3,
        }
    }
}

#[derive(knuffel::Decode, Debug, Clone, PartialEq)]
pub struct Culling {
    /// Margin in world units by which the viewport is expanded before
    /// classifying items as visible.
    #[knuffel(child, unwrap(argument), default = Self::default().buffer)]
    pub buffer: f64,
}

impl Default for Culling {
    fn default() -> Self {
        Self { buffer: 200. }
    }
}

#[derive(knuffel::Decode, Debug, Clone, PartialEq)]
pub struct Interaction {
    #[knuffel(child, unwrap(argument), default = Self::default().pointer_throttle_ms)]
    pub pointer_throttle_ms: u64,
}

impl Default for Interaction {
    fn default() -> Self {
        Self {
            pointer_throttle_ms: 8,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> miette::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("error reading {path:?}"))?;

        let config = Self::parse(
            path.file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("config.kdl"),
            &contents,
        )?;

        tracing::debug!("loaded config from {path:?}");
        Ok(config)
    }

    pub fn parse(filename: &str, text: &str) -> miette::Result<Self> {
        let config = knuffel::parse::<Self>(filename, text).map_err(miette::Report::new)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> miette::Result<()> {
        if !(self.grid.size > 0.) {
            return Err(miette!("grid size must be positive"));
        }
        if !(self.zoom.min > 0.) {
            return Err(miette!("zoom min must be positive"));
        }
        if self.zoom.min >= self.zoom.max {
            return Err(miette!("zoom min must be below zoom max"));
        }
        if !(self.zoom.wheel_step > 1.) {
            return Err(miette!("zoom wheel-step must be above 1.0"));
        }
        if self.history.capacity == 0 {
            return Err(miette!("history capacity must be at least 1"));
        }
        Ok(())
    }
}
