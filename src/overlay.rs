//! Grid-line overlay derivation and preview rendering.
//!
//! Line positions are a pure function of the [`GridSpec`]: fractional
//! offsets `i/rows` and `i/cols` for the interior lines. The drawing
//! helpers render those lines onto an image for previewing a cut before it
//! happens; they have no effect on the cut or stitch results.
//!
//! # Examples
//!
//! ```rust
//! use gridcut::{overlay::*, GridSpec};
//! use image::{Rgba, RgbaImage};
//!
//! let spec = GridSpec::new(4, 2);
//! assert_eq!(row_fractions(&spec).as_slice(), &[0.25, 0.5, 0.75]);
//! assert_eq!(column_fractions(&spec).as_slice(), &[0.5]);
//!
//! let mut preview = RgbaImage::from_pixel(100, 100, Rgba([0, 0, 0, 255]));
//! draw_grid_overlay(&mut preview, &spec, &OverlayConfig::default());
//! ```

use std::path::Path;

use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::drawing::draw_line_segment_mut;

use crate::{GridError, GridSpec, SmallVecLine};

/// Configuration for rendering grid-line overlays.
#[derive(Debug, Clone)]
pub struct OverlayConfig {
    /// Color for horizontal grid lines (row boundaries).
    pub row_color: Rgba<u8>,
    /// Color for vertical grid lines (column boundaries).
    pub column_color: Rgba<u8>,
    /// Thickness of grid lines in pixels.
    pub line_thickness: u32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        OverlayConfig {
            row_color: Rgba([255, 0, 0, 255]),    // Red
            column_color: Rgba([0, 0, 255, 255]), // Blue
            line_thickness: 2,
        }
    }
}

/// Fractional vertical offsets of the interior row boundaries
/// (`i/rows` for `i = 1..rows`).
pub fn row_fractions(spec: &GridSpec) -> SmallVecLine<f32> {
    (1..spec.rows).map(|i| i as f32 / spec.rows as f32).collect()
}

/// Fractional horizontal offsets of the interior column boundaries
/// (`i/cols` for `i = 1..cols`).
pub fn column_fractions(spec: &GridSpec) -> SmallVecLine<f32> {
    (1..spec.cols).map(|i| i as f32 / spec.cols as f32).collect()
}

/// Draws the grid lines described by `spec` over `image`.
pub fn draw_grid_overlay(image: &mut RgbaImage, spec: &GridSpec, config: &OverlayConfig) {
    let (width, height) = image.dimensions();

    for fraction in row_fractions(spec) {
        let y = fraction * height as f32;
        for offset in 0..config.line_thickness {
            draw_line_segment_mut(
                image,
                (0.0, y + offset as f32),
                (width as f32, y + offset as f32),
                config.row_color,
            );
        }
    }

    for fraction in column_fractions(spec) {
        let x = fraction * width as f32;
        for offset in 0..config.line_thickness {
            draw_line_segment_mut(
                image,
                (x + offset as f32, 0.0),
                (x + offset as f32, height as f32),
                config.column_color,
            );
        }
    }
}

/// Saves a copy of `image` with the grid overlay drawn on it.
///
/// # Errors
/// Returns [`GridError::ExportFailure`] if the preview cannot be written.
pub fn save_image_with_overlay(
    image: &DynamicImage,
    spec: &GridSpec,
    output_path: impl AsRef<Path>,
    config: &OverlayConfig,
) -> Result<(), GridError> {
    let mut rgba_img = image.to_rgba8();
    draw_grid_overlay(&mut rgba_img, spec, config);
    rgba_img
        .save(output_path.as_ref())
        .map_err(|e| GridError::ExportFailure(e.to_string()))
}
