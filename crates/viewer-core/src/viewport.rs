//! Zoom and scroll state of the display surface.
//!
//! The content node has an unscaled base size; its visual size is
//! `base * scale`. Scroll positions are stored as fractions of the scrollable
//! range, so the offset in scaled content space is
//! `fraction * max(0, content - viewport)`.

/// Scale plus scroll fractions over a scrollable viewport.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportTransform {
    scale: f64,
    zoom_intensity: f64,
    content_width: f64,
    content_height: f64,
    viewport_width: f64,
    viewport_height: f64,
    h_value: f64,
    v_value: f64,
}

impl ViewportTransform {
    pub fn new(zoom_intensity: f64, scale: f64, viewport_width: f64, viewport_height: f64) -> Self {
        Self {
            scale: clamp_unit(scale),
            zoom_intensity,
            content_width: 0.0,
            content_height: 0.0,
            viewport_width: viewport_width.max(0.0),
            viewport_height: viewport_height.max(0.0),
            h_value: 0.0,
            v_value: 0.0,
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn zoom_intensity(&self) -> f64 {
        self.zoom_intensity
    }

    pub fn h_value(&self) -> f64 {
        self.h_value
    }

    pub fn v_value(&self) -> f64 {
        self.v_value
    }

    pub fn viewport_size(&self) -> (f64, f64) {
        (self.viewport_width, self.viewport_height)
    }

    /// Unscaled size of the mounted content.
    pub fn content_size(&self) -> (f64, f64) {
        (self.content_width, self.content_height)
    }

    pub fn scaled_content_size(&self) -> (f64, f64) {
        (self.content_width * self.scale, self.content_height * self.scale)
    }

    pub fn set_content_size(&mut self, width: f64, height: f64) {
        self.content_width = width.max(0.0);
        self.content_height = height.max(0.0);
    }

    pub fn set_viewport_size(&mut self, width: f64, height: f64) {
        self.viewport_width = width.max(0.0);
        self.viewport_height = height.max(0.0);
    }

    pub fn set_scroll_fractions(&mut self, h_value: f64, v_value: f64) {
        self.h_value = clamp_unit(h_value);
        self.v_value = clamp_unit(v_value);
    }

    pub fn reset_scroll(&mut self) {
        self.h_value = 0.0;
        self.v_value = 0.0;
    }

    /// Restores `scale` and scrolls back to the origin.
    pub fn reset(&mut self, scale: f64) {
        self.scale = clamp_unit(scale);
        self.reset_scroll();
    }

    /// Rescales without positional adjustment, as driven by the zoom control.
    pub fn set_scale(&mut self, scale: f64) -> f64 {
        self.scale = clamp_unit(scale);
        self.scale
    }

    /// Scroll offset in scaled content space.
    pub fn scroll_offset(&self) -> (f64, f64) {
        let (width, height) = self.scaled_content_size();
        (
            self.h_value * (width - self.viewport_width).max(0.0),
            self.v_value * (height - self.viewport_height).max(0.0),
        )
    }

    /// Unscaled content coordinate under a viewport position, if the
    /// content is visible at all.
    pub fn content_point_at(&self, cursor: (f64, f64)) -> Option<(f64, f64)> {
        if self.scale <= 0.0 {
            return None;
        }

        let (offset_x, offset_y) = self.scroll_offset();
        Some(((offset_x + cursor.0) / self.scale, (offset_y + cursor.1) / self.scale))
    }

    /// Applies a wheel gesture of `delta` with the cursor at `cursor`
    /// (viewport coordinates) and returns the new scale.
    ///
    /// The content point under the cursor stays under the cursor as long as
    /// the resulting scroll position lies inside the scrollable range. The
    /// positional correction uses the clamped factor, so a gesture that hits
    /// a scale bound is corrected relative to that bound.
    pub fn zoom_at(&mut self, delta: f64, cursor: (f64, f64)) -> f64 {
        let zoom_factor = (delta * self.zoom_intensity).exp();
        let anchor = self.content_point_at(cursor);

        self.scale = clamp_unit(self.scale * zoom_factor);

        let Some((anchor_x, anchor_y)) = anchor else {
            self.reset_scroll();
            return self.scale;
        };

        // Scroll so the anchor lands under the cursor again at the new scale.
        let (width, height) = self.scaled_content_size();
        self.h_value =
            scroll_fraction(anchor_x * self.scale - cursor.0, width - self.viewport_width);
        self.v_value =
            scroll_fraction(anchor_y * self.scale - cursor.1, height - self.viewport_height);

        self.scale
    }
}

fn scroll_fraction(offset: f64, range: f64) -> f64 {
    if range <= 0.0 {
        return 0.0;
    }

    clamp_unit(offset / range)
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }

    value.clamp(0.0, 1.0)
}

/// Zoom level control bound to the viewport scale.
///
/// A user change produces a scale to apply; a change pushed from the
/// viewport through [`ZoomControl::sync_from`] does not, so updating the
/// control after a gesture never re-enters the rescale path.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoomControl {
    value: f64,
    syncing: bool,
}

impl ZoomControl {
    pub fn new(value: f64) -> Self {
        Self { value: clamp_unit(value), syncing: false }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Control value changed; returns the scale the viewport should adopt.
    pub fn changed(&mut self, value: f64) -> Option<f64> {
        self.value = clamp_unit(value);

        if self.syncing {
            None
        } else {
            Some(self.value)
        }
    }

    /// Mirrors the viewport scale into the control.
    pub fn sync_from(&mut self, scale: f64) {
        self.syncing = true;
        let ignored = self.changed(scale);
        debug_assert!(ignored.is_none());
        self.syncing = false;
    }
}
