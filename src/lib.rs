//! This crate provides functionality for cutting images into grids of
//! rectangular pieces and for stitching grids of images back into one
//! composed image. It uses the `image` and `imageproc` crates for raster
//! manipulation and `insta` for snapshot testing.
//!
//! # Example
//! ```
//! use gridcut::{cut_image, CutConfig, GridSpec};
//! use image::{DynamicImage, Rgba, RgbaImage};
//!
//! let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
//!     64,
//!     64,
//!     Rgba([10, 20, 30, 255]),
//! ));
//! let pieces = cut_image(&img, GridSpec::new(2, 2), &CutConfig::default()).unwrap();
//!
//! assert_eq!(pieces.len(), 4);
//! assert_eq!(pieces[0].filename, "piece_1_1.png");
//! assert_eq!(pieces[0].surface.dimensions(), (32, 32));
//! ```

/// Export module for writing pieces and composed images to the filesystem.
///
/// # Example
/// ```no_run
/// use gridcut::{cut_image, export, CutConfig, GridSpec};
///
/// let img = gridcut::open_image("input.png").unwrap();
/// let pieces = cut_image(&img, GridSpec::new(3, 3), &CutConfig::default()).unwrap();
/// export::export_pieces(&pieces, "pieces/").unwrap();
/// ```
pub mod export;
/// This module derives grid-line positions from a [`GridSpec`] and renders
/// preview overlays onto images.
pub mod overlay;
mod stitch;
mod surface;

use std::path::Path;

use image::{DynamicImage, GenericImageView, ImageFormat};
use rayon::prelude::*;
use smallvec::SmallVec;
use thiserror::Error;
use tracing::*;

pub use stitch::{stitch, Composed, LayoutMode, SlotGrid, StitchConfig, DEFAULT_BACKGROUND};
pub use surface::Surface;

// Determined through benchmarking typical use cases
const DEFAULT_SMALLVEC_SIZE: usize = 32;

/// Largest grid accepted by [`CutConfig::default`] in either direction.
pub const DEFAULT_MAX_CUT_GRID: u32 = 20;
/// Largest grid accepted by [`StitchConfig::default`] in either direction.
pub const DEFAULT_MAX_STITCH_GRID: u32 = 10;

#[derive(Error, Debug)]
pub enum GridError {
    #[error("Invalid surface dimensions: width={width}, height={height}")]
    InvalidDimension { width: u32, height: u32 },

    #[error("Invalid grid spec: rows={rows}, cols={cols} (both must be within 1..={max})")]
    InvalidGridSpec { rows: u32, cols: u32, max: u32 },

    #[error("No image loaded")]
    NoImageLoaded,

    #[error("Cannot stitch an empty grid")]
    EmptyGrid,

    #[error("Failed to decode image: {0}")]
    InvalidImageFormat(String),

    #[error("Crop region out of bounds: x={x}, y={y}, width={width}, height={height}")]
    OutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },

    #[error("Failed to encode image: {0}")]
    EncodingFailure(String),

    #[error("Failed to export: {0}")]
    ExportFailure(String),
}

/// A type alias for SmallVec with an optimized stack-allocated buffer size.
pub type SmallVecLine<T> = SmallVec<[T; DEFAULT_SMALLVEC_SIZE]>;

/// A row/column grid dimension request.
///
/// The upper bound is supplied by the caller through [`CutConfig`] or
/// [`StitchConfig`]; the spec itself only carries the requested counts.
///
/// # Example
/// ```
/// use gridcut::GridSpec;
///
/// let spec = GridSpec::new(3, 4);
/// assert_eq!(spec.cell_count(), 12);
/// assert!(spec.validate(20).is_ok());
/// assert!(spec.validate(2).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct GridSpec {
    pub rows: u32,
    pub cols: u32,
}

impl GridSpec {
    /// Creates a new `GridSpec` with the given row and column counts.
    pub fn new(rows: u32, cols: u32) -> Self {
        Self { rows, cols }
    }

    /// Total number of cells described by this spec.
    pub fn cell_count(&self) -> u32 {
        self.rows * self.cols
    }

    /// Checks the spec against an inclusive upper bound.
    ///
    /// # Errors
    /// Returns [`GridError::InvalidGridSpec`] if either dimension is zero or
    /// exceeds `max_grid`.
    pub fn validate(&self, max_grid: u32) -> Result<(), GridError> {
        if self.rows < 1 || self.cols < 1 || self.rows > max_grid || self.cols > max_grid {
            error!(
                "Invalid grid spec: rows={}, cols={}, max={}",
                self.rows, self.cols, max_grid
            );
            return Err(GridError::InvalidGridSpec {
                rows: self.rows,
                cols: self.cols,
                max: max_grid,
            });
        }
        Ok(())
    }
}

/// Configuration for grid cutting.
///
/// # Example
/// ```
/// use gridcut::CutConfig;
/// use image::ImageFormat;
///
/// let config = CutConfig::default();
/// assert_eq!(config.max_grid, 20);
/// assert_eq!(config.format, ImageFormat::Png);
/// assert_eq!(config.enable_parallel, true);
/// ```
#[derive(Debug, Clone)]
pub struct CutConfig {
    /// Inclusive upper bound on rows and columns (default: 20)
    pub max_grid: u32,
    /// Encoded output format for pieces (default: PNG)
    pub format: ImageFormat,
    /// Enable parallel piece extraction (default: true)
    pub enable_parallel: bool,
}

impl CutConfig {
    /// Creates a new `CutConfig` with the specified parameters.
    ///
    /// # Example
    /// ```
    /// use gridcut::CutConfig;
    /// use image::ImageFormat;
    ///
    /// let config = CutConfig::new(10, ImageFormat::Png, false);
    /// assert_eq!(config.max_grid, 10);
    /// assert_eq!(config.enable_parallel, false);
    /// ```
    pub fn new(max_grid: u32, format: ImageFormat, enable_parallel: bool) -> Self {
        Self {
            max_grid: max_grid.max(1), // A grid needs at least one cell
            format,
            enable_parallel,
        }
    }
}

impl Default for CutConfig {
    fn default() -> Self {
        CutConfig::new(DEFAULT_MAX_CUT_GRID, ImageFormat::Png, true)
    }
}

/// One extracted sub-image of a cut operation, labeled with its 1-based
/// grid position.
#[derive(Debug, Clone, PartialEq)]
pub struct Piece {
    /// 1-based row of this piece within the grid.
    pub row: u32,
    /// 1-based column of this piece within the grid.
    pub col: u32,
    /// The piece's pixel content.
    pub surface: Surface,
    /// The piece encoded in the configured output format.
    pub encoded: Vec<u8>,
    /// Stable, collision-free output name (`piece_{row}_{col}.{ext}`).
    pub filename: String,
}

impl Piece {
    /// Returns the piece's metadata without its pixel payload.
    pub fn info(&self) -> PieceInfo {
        PieceInfo {
            row: self.row,
            col: self.col,
            width: self.surface.width(),
            height: self.surface.height(),
            filename: self.filename.clone(),
        }
    }
}

/// Lightweight piece metadata for gallery-style consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PieceInfo {
    pub row: u32,
    pub col: u32,
    pub width: u32,
    pub height: u32,
    pub filename: String,
}

/// Builds the output name for a piece at the given 1-based position.
pub fn piece_filename(row: u32, col: u32, format: ImageFormat) -> String {
    let ext = format.extensions_str().first().copied().unwrap_or("img");
    format!("piece_{}_{}.{}", row, col, ext)
}

/// Decodes raw image bytes into a [`DynamicImage`].
///
/// # Errors
/// Returns [`GridError::InvalidImageFormat`] for non-image or corrupt input.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, GridError> {
    image::load_from_memory(bytes).map_err(|e| {
        error!("Failed to decode image: {}", e);
        GridError::InvalidImageFormat(e.to_string())
    })
}

/// Opens and decodes an image file.
///
/// # Errors
/// Returns [`GridError::InvalidImageFormat`] if the file cannot be read or
/// decoded.
pub fn open_image(path: impl AsRef<Path>) -> Result<DynamicImage, GridError> {
    image::open(path.as_ref()).map_err(|e| {
        error!("Failed to open image {:?}: {}", path.as_ref(), e);
        GridError::InvalidImageFormat(e.to_string())
    })
}

/// Partitions `image` into `spec.rows * spec.cols` uniformly sized pieces.
///
/// Piece dimensions are `floor(width / cols)` by `floor(height / rows)`;
/// when the image does not divide evenly, the trailing right/bottom pixels
/// are discarded in favor of a uniform cell size. The returned pieces are
/// sorted by `(row, col)` ascending regardless of extraction order, and the
/// whole call fails if any single piece fails.
///
/// # Errors
/// [`GridError::InvalidGridSpec`] for an out-of-bounds spec and
/// [`GridError::InvalidDimension`] when the grid asks for more cells than
/// the image has pixels in either direction.
///
/// # Example
/// ```
/// use gridcut::{cut_image, CutConfig, GridSpec};
/// use image::{DynamicImage, Rgba, RgbaImage};
///
/// let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
///     10,
///     10,
///     Rgba([0, 0, 0, 255]),
/// ));
/// let pieces = cut_image(&img, GridSpec::new(3, 3), &CutConfig::default()).unwrap();
///
/// // 10 does not divide by 3: each piece is 3x3, one trailing pixel per
/// // axis is discarded.
/// assert_eq!(pieces.len(), 9);
/// assert!(pieces.iter().all(|p| p.surface.dimensions() == (3, 3)));
/// ```
pub fn cut_image(
    image: &DynamicImage,
    spec: GridSpec,
    config: &CutConfig,
) -> Result<Vec<Piece>, GridError> {
    trace!("Cutting image with spec {:?} and config {:?}", spec, config);
    spec.validate(config.max_grid)?;

    let (width, height) = image.dimensions();
    let piece_width = width / spec.cols;
    let piece_height = height / spec.rows;
    if piece_width == 0 || piece_height == 0 {
        error!(
            "Grid {}x{} leaves no pixels per cell for a {}x{} image",
            spec.rows, spec.cols, width, height
        );
        return Err(GridError::InvalidDimension {
            width: piece_width,
            height: piece_height,
        });
    }
    debug!(
        "Extracting {} pieces of {}x{}",
        spec.cell_count(),
        piece_width,
        piece_height
    );

    let source = Surface::from_image(image);
    let mut pieces = if config.enable_parallel {
        cut_pieces_parallel(&source, spec, piece_width, piece_height, config.format)?
    } else {
        cut_pieces_sequential(&source, spec, piece_width, piece_height, config.format)?
    };

    // Completion order is unspecified; the returned sequence is not.
    pieces.sort_unstable_by_key(|piece| (piece.row, piece.col));
    Ok(pieces)
}

/// Extract pieces in parallel using rayon, one task per cell.
fn cut_pieces_parallel(
    source: &Surface,
    spec: GridSpec,
    piece_width: u32,
    piece_height: u32,
    format: ImageFormat,
) -> Result<Vec<Piece>, GridError> {
    trace!("Extracting pieces in parallel");
    (0..spec.cell_count())
        .into_par_iter()
        .map(|index| {
            extract_piece(
                source,
                index / spec.cols,
                index % spec.cols,
                piece_width,
                piece_height,
                format,
            )
        })
        .collect()
}

/// Extract pieces sequentially in row-major order.
fn cut_pieces_sequential(
    source: &Surface,
    spec: GridSpec,
    piece_width: u32,
    piece_height: u32,
    format: ImageFormat,
) -> Result<Vec<Piece>, GridError> {
    trace!("Extracting pieces sequentially");
    (0..spec.cell_count())
        .map(|index| {
            extract_piece(
                source,
                index / spec.cols,
                index % spec.cols,
                piece_width,
                piece_height,
                format,
            )
        })
        .collect()
}

/// Crops and encodes a single cell. `row` and `col` are 0-based here and
/// exposed 1-based on the resulting [`Piece`].
fn extract_piece(
    source: &Surface,
    row: u32,
    col: u32,
    piece_width: u32,
    piece_height: u32,
    format: ImageFormat,
) -> Result<Piece, GridError> {
    let surface = source.crop(
        col * piece_width,
        row * piece_height,
        piece_width,
        piece_height,
    )?;
    let encoded = surface.encode(format)?;
    Ok(Piece {
        row: row + 1,
        col: col + 1,
        filename: piece_filename(row + 1, col + 1, format),
        surface,
        encoded,
    })
}

/// Holds the currently loaded source image and cut configuration for one
/// interactive session.
///
/// Each [`cut`](CutSession::cut) call is an independent transform of the
/// loaded image; the session never retains pieces.
///
/// # Example
/// ```
/// use gridcut::{CutConfig, CutSession, GridError, GridSpec};
/// use image::{DynamicImage, Rgba, RgbaImage};
///
/// let mut session = CutSession::new(CutConfig::default());
/// assert!(matches!(
///     session.cut(GridSpec::new(2, 2)),
///     Err(GridError::NoImageLoaded)
/// ));
///
/// session.set_image(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
///     8,
///     8,
///     Rgba([0, 0, 0, 255]),
/// )));
/// assert_eq!(session.cut(GridSpec::new(2, 2)).unwrap().len(), 4);
/// ```
#[derive(Debug, Clone)]
pub struct CutSession {
    image: Option<DynamicImage>,
    config: CutConfig,
}

impl CutSession {
    /// Creates a session with no image loaded.
    pub fn new(config: CutConfig) -> Self {
        Self {
            image: None,
            config,
        }
    }

    /// Decodes `bytes` and loads the result as the session image.
    ///
    /// # Errors
    /// Returns [`GridError::InvalidImageFormat`] without touching the
    /// previously loaded image.
    pub fn load_image(&mut self, bytes: &[u8]) -> Result<(), GridError> {
        self.image = Some(decode_image(bytes)?);
        Ok(())
    }

    /// Loads an already decoded image.
    pub fn set_image(&mut self, image: DynamicImage) {
        self.image = Some(image);
    }

    /// Unloads and returns the session image, if any.
    pub fn clear_image(&mut self) -> Option<DynamicImage> {
        self.image.take()
    }

    /// The currently loaded image, if any.
    pub fn image(&self) -> Option<&DynamicImage> {
        self.image.as_ref()
    }

    /// The session's cut configuration.
    pub fn config(&self) -> &CutConfig {
        &self.config
    }

    /// Cuts the loaded image with this session's configuration.
    ///
    /// # Errors
    /// Returns [`GridError::NoImageLoaded`] when no image has been loaded,
    /// otherwise whatever [`cut_image`] reports.
    pub fn cut(&self, spec: GridSpec) -> Result<Vec<Piece>, GridError> {
        let image = self.image.as_ref().ok_or(GridError::NoImageLoaded)?;
        cut_image(image, spec, &self.config)
    }
}

impl Default for CutSession {
    fn default() -> Self {
        CutSession::new(CutConfig::default())
    }
}
