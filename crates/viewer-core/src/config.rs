//! Viewer configuration.
//!
//! Everything the viewer needs to know about resolutions and zoom behavior
//! lives in one [`ViewerConfig`]. It is in-memory only: the defaults can be
//! overridden programmatically or from environment variables, and nothing is
//! ever written back.

use std::env;

/// Resolution and layout settings for a viewer session.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ViewerConfig {
    /// Resolution for the single page shown in PageByPage and Slideshow
    pub display_dpi: u32,
    /// Resolution for thumbnail grid entries
    pub thumbnail_dpi: u32,
    /// Resolution for pages stacked in continuous scroll
    pub continuous_dpi: u32,
    /// Resolution for PNG/JPEG export
    pub export_dpi: u32,
    /// Multiplier applied to wheel deltas before exponentiation
    pub zoom_intensity: f64,
    /// Viewport scale after entering a mode, in `[0, 1]`
    pub initial_scale: f64,
    /// Width reserved for one thumbnail cell, in pixels
    pub thumbnail_item_width: u32,
    /// Initial viewport width in pixels
    pub viewport_width: f64,
    /// Initial viewport height in pixels
    pub viewport_height: f64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            display_dpi: 300,
            thumbnail_dpi: 72,
            continuous_dpi: 150,
            export_dpi: 300,
            zoom_intensity: 0.04,
            initial_scale: 0.5,
            thumbnail_item_width: 160,
            viewport_width: 800.0,
            viewport_height: 600.0,
        }
    }
}

impl ViewerConfig {
    /// Sets the single-page display resolution.
    pub fn with_display_dpi(mut self, dpi: u32) -> Self {
        self.display_dpi = dpi.max(1);
        self
    }

    /// Sets the thumbnail resolution.
    pub fn with_thumbnail_dpi(mut self, dpi: u32) -> Self {
        self.thumbnail_dpi = dpi.max(1);
        self
    }

    /// Sets the continuous-scroll resolution.
    pub fn with_continuous_dpi(mut self, dpi: u32) -> Self {
        self.continuous_dpi = dpi.max(1);
        self
    }

    /// Sets the image export resolution.
    pub fn with_export_dpi(mut self, dpi: u32) -> Self {
        self.export_dpi = dpi.max(1);
        self
    }

    pub fn with_zoom_intensity(mut self, intensity: f64) -> Self {
        self.zoom_intensity = intensity;
        self
    }

    pub fn with_initial_scale(mut self, scale: f64) -> Self {
        self.initial_scale = scale.clamp(0.0, 1.0);
        self
    }

    pub fn with_thumbnail_item_width(mut self, width: u32) -> Self {
        self.thumbnail_item_width = width.max(1);
        self
    }

    pub fn with_viewport_size(mut self, width: f64, height: f64) -> Self {
        self.viewport_width = width.max(0.0);
        self.viewport_height = height.max(0.0);
        self
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PAGEVIEW_DISPLAY_DPI`: single-page resolution (default: 300)
    /// - `PAGEVIEW_THUMBNAIL_DPI`: thumbnail resolution (default: 72)
    /// - `PAGEVIEW_CONTINUOUS_DPI`: continuous scroll resolution (default: 150)
    /// - `PAGEVIEW_EXPORT_DPI`: image export resolution (default: 300)
    /// - `PAGEVIEW_ZOOM_INTENSITY`: wheel zoom intensity (default: 0.04)
    ///
    /// # Errors
    /// Returns an error if any variable is set to something other than a
    /// positive number.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(dpi) = dpi_from_env("PAGEVIEW_DISPLAY_DPI")? {
            config.display_dpi = dpi;
        }
        if let Some(dpi) = dpi_from_env("PAGEVIEW_THUMBNAIL_DPI")? {
            config.thumbnail_dpi = dpi;
        }
        if let Some(dpi) = dpi_from_env("PAGEVIEW_CONTINUOUS_DPI")? {
            config.continuous_dpi = dpi;
        }
        if let Some(dpi) = dpi_from_env("PAGEVIEW_EXPORT_DPI")? {
            config.export_dpi = dpi;
        }

        if let Ok(val) = env::var("PAGEVIEW_ZOOM_INTENSITY") {
            config.zoom_intensity = val
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|intensity| intensity.is_finite() && *intensity > 0.0)
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: "PAGEVIEW_ZOOM_INTENSITY".to_string(),
                    value: val.clone(),
                })?;
        }

        Ok(config)
    }
}

fn dpi_from_env(key: &str) -> Result<Option<u32>, ConfigError> {
    let Ok(val) = env::var(key) else {
        return Ok(None);
    };

    val.trim()
        .parse::<u32>()
        .ok()
        .filter(|dpi| *dpi > 0)
        .map(Some)
        .ok_or_else(|| ConfigError::InvalidValue { key: key.to_string(), value: val.clone() })
}

/// Errors that can occur while building a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid value for a configuration parameter
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
}
