use std::collections::BTreeMap;

use image::{DynamicImage, GenericImageView, ImageFormat, Rgba};
use tracing::*;

use crate::{GridError, GridSpec, Surface, DEFAULT_MAX_STITCH_GRID};

/// Background color used for unpopulated cells and letterbox padding.
pub const DEFAULT_BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// How each slot image is laid out within its cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum LayoutMode {
    /// Stretch every image to exactly fill its cell, ignoring its own
    /// aspect ratio. The cell size is the average of the slot images'
    /// natural dimensions, rounded to the nearest pixel.
    Stretch,
    /// Scale each image uniformly by `min(cell_w/w, cell_h/h)` and center
    /// it, letterboxing against the background. The cell size is the
    /// maximum of the slot images' natural dimensions.
    AspectPreserve,
}

/// Configuration for grid stitching.
///
/// # Example
/// ```
/// use gridcut::{LayoutMode, StitchConfig};
///
/// let config = StitchConfig::default();
/// assert_eq!(config.max_grid, 10);
/// assert_eq!(config.mode, LayoutMode::Stretch);
/// ```
#[derive(Debug, Clone)]
pub struct StitchConfig {
    /// Inclusive upper bound on rows and columns (default: 10)
    pub max_grid: u32,
    /// Cell layout policy (default: stretch)
    pub mode: LayoutMode,
    /// Canvas background color (default: opaque white)
    pub background: Rgba<u8>,
    /// Encoded output format (default: PNG)
    pub format: ImageFormat,
}

impl StitchConfig {
    /// Creates a new `StitchConfig` with the specified parameters.
    pub fn new(max_grid: u32, mode: LayoutMode, background: Rgba<u8>, format: ImageFormat) -> Self {
        Self {
            max_grid: max_grid.max(1), // A grid needs at least one cell
            mode,
            background,
            format,
        }
    }
}

impl Default for StitchConfig {
    fn default() -> Self {
        StitchConfig::new(
            DEFAULT_MAX_STITCH_GRID,
            LayoutMode::Stretch,
            DEFAULT_BACKGROUND,
            ImageFormat::Png,
        )
    }
}

/// A sparse mapping from 0-based `(row, col)` positions to source images.
///
/// The stitcher reads it once per call; callers mutate it through the
/// explicit accessors below. Iteration order is row-major and
/// deterministic.
///
/// # Example
/// ```
/// use gridcut::SlotGrid;
/// use image::{DynamicImage, Rgba, RgbaImage};
///
/// let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
///     4,
///     4,
///     Rgba([0, 0, 0, 255]),
/// ));
/// let mut slots = SlotGrid::new();
/// slots.insert(0, 1, img);
/// assert_eq!(slots.len(), 1);
/// assert!(slots.get(0, 1).is_some());
/// assert!(slots.remove(0, 1).is_some());
/// assert!(slots.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct SlotGrid {
    slots: BTreeMap<(u32, u32), DynamicImage>,
}

impl SlotGrid {
    /// Creates an empty slot grid.
    pub fn new() -> Self {
        Self::default()
    }

    /// Populates the slot at `(row, col)`, returning the previously held
    /// image if the slot was already populated.
    pub fn insert(&mut self, row: u32, col: u32, image: DynamicImage) -> Option<DynamicImage> {
        self.slots.insert((row, col), image)
    }

    /// Clears the slot at `(row, col)`, returning its image if populated.
    pub fn remove(&mut self, row: u32, col: u32) -> Option<DynamicImage> {
        self.slots.remove(&(row, col))
    }

    /// The image at `(row, col)`, if populated.
    pub fn get(&self, row: u32, col: u32) -> Option<&DynamicImage> {
        self.slots.get(&(row, col))
    }

    /// Removes all images.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Number of populated slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no slot is populated.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterates populated slots in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = ((u32, u32), &DynamicImage)> {
        self.slots.iter().map(|(&position, image)| (position, image))
    }
}

/// The output of a stitch operation: the composed canvas, its encoded byte
/// form, and the uniform cell size that was used.
#[derive(Debug, Clone, PartialEq)]
pub struct Composed {
    pub surface: Surface,
    pub encoded: Vec<u8>,
    pub cell_width: u32,
    pub cell_height: u32,
}

/// Uniform cell size over all populated slots, per layout mode.
fn cell_size(slots: &SlotGrid, mode: LayoutMode) -> (u32, u32) {
    match mode {
        LayoutMode::Stretch => {
            let count = slots.len() as f64;
            let (width_sum, height_sum) =
                slots.iter().fold((0.0, 0.0), |(ws, hs), (_, image)| {
                    let (w, h) = image.dimensions();
                    (ws + w as f64, hs + h as f64)
                });
            (
                ((width_sum / count).round() as u32).max(1),
                ((height_sum / count).round() as u32).max(1),
            )
        }
        LayoutMode::AspectPreserve => slots.iter().fold((1, 1), |(w_max, h_max), (_, image)| {
            let (w, h) = image.dimensions();
            (w_max.max(w), h_max.max(h))
        }),
    }
}

/// Composes the populated slots into one image of
/// `cell_width * cols` by `cell_height * rows` pixels.
///
/// The canvas is background-filled before any cell is drawn; unpopulated
/// cells stay background-colored. Slots addressed outside `spec` still
/// participate in cell sizing and are drawn clipped.
///
/// # Errors
/// [`GridError::InvalidGridSpec`] for an out-of-bounds spec and
/// [`GridError::EmptyGrid`] when no slot is populated; both are raised
/// before any allocation.
///
/// # Example
/// ```
/// use gridcut::{stitch, GridSpec, LayoutMode, SlotGrid, StitchConfig};
/// use image::{DynamicImage, Rgba, RgbaImage};
///
/// let solid = |w, h, c| DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba(c)));
/// let mut slots = SlotGrid::new();
/// slots.insert(0, 0, solid(100, 50, [255, 0, 0, 255]));
/// slots.insert(0, 1, solid(200, 100, [0, 0, 255, 255]));
///
/// // Stretch mode sizes cells by the average natural dimensions.
/// let composed = stitch(&slots, GridSpec::new(1, 2), &StitchConfig::default()).unwrap();
/// assert_eq!((composed.cell_width, composed.cell_height), (150, 75));
/// assert_eq!(composed.surface.dimensions(), (300, 75));
/// ```
pub fn stitch(
    slots: &SlotGrid,
    spec: GridSpec,
    config: &StitchConfig,
) -> Result<Composed, GridError> {
    trace!(
        "Stitching {} slots with spec {:?} and config {:?}",
        slots.len(),
        spec,
        config
    );
    spec.validate(config.max_grid)?;
    if slots.is_empty() {
        error!("Stitch requested with no populated slots");
        return Err(GridError::EmptyGrid);
    }

    let (cell_width, cell_height) = cell_size(slots, config.mode);
    debug!(
        "Stitch cell size {}x{} ({:?})",
        cell_width, cell_height, config.mode
    );

    let mut surface = Surface::create(cell_width * spec.cols, cell_height * spec.rows)?;
    // The background must land before any cell draw; letterboxing and
    // unpopulated cells rely on it.
    surface.fill(config.background);

    for ((row, col), image) in slots.iter() {
        let cell_x = (col * cell_width) as i64;
        let cell_y = (row * cell_height) as i64;
        match config.mode {
            LayoutMode::Stretch => {
                surface.draw_image(image, cell_x, cell_y, cell_width, cell_height);
            }
            LayoutMode::AspectPreserve => {
                let (width, height) = image.dimensions();
                let scale = (cell_width as f64 / width as f64)
                    .min(cell_height as f64 / height as f64);
                let draw_width = ((width as f64 * scale).round() as u32).clamp(1, cell_width);
                let draw_height = ((height as f64 * scale).round() as u32).clamp(1, cell_height);
                let offset_x = ((cell_width - draw_width) / 2) as i64;
                let offset_y = ((cell_height - draw_height) / 2) as i64;
                surface.draw_image(
                    image,
                    cell_x + offset_x,
                    cell_y + offset_y,
                    draw_width,
                    draw_height,
                );
            }
        }
    }

    let encoded = surface.encode(config.format)?;
    Ok(Composed {
        surface,
        encoded,
        cell_width,
        cell_height,
    })
}
