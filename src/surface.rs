use std::io::Cursor;

use image::{imageops, DynamicImage, GenericImageView, ImageFormat, Rgba, RgbaImage};
use tracing::*;

use crate::GridError;

/// An owned 2D pixel buffer that can be filled, drawn onto, cropped, and
/// encoded. Both the cutter and the stitcher build their outputs on top of
/// this type.
///
/// # Example
/// ```
/// use gridcut::Surface;
/// use image::Rgba;
///
/// let mut surface = Surface::create(4, 4).unwrap();
/// surface.fill(Rgba([255, 0, 0, 255]));
/// assert_eq!(surface.as_image().get_pixel(3, 3), &Rgba([255, 0, 0, 255]));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Surface {
    buffer: RgbaImage,
}

impl Surface {
    /// Allocates a blank surface of the given size.
    ///
    /// # Errors
    /// Returns [`GridError::InvalidDimension`] if either dimension is zero.
    ///
    /// # Example
    /// ```
    /// use gridcut::{GridError, Surface};
    ///
    /// assert!(Surface::create(8, 8).is_ok());
    /// assert!(matches!(
    ///     Surface::create(0, 8),
    ///     Err(GridError::InvalidDimension { .. })
    /// ));
    /// ```
    pub fn create(width: u32, height: u32) -> Result<Self, GridError> {
        if width == 0 || height == 0 {
            error!(
                "Invalid surface dimensions: width={}, height={}",
                width, height
            );
            return Err(GridError::InvalidDimension { width, height });
        }
        Ok(Self {
            buffer: RgbaImage::new(width, height),
        })
    }

    /// Copies a decoded image into a new surface.
    pub fn from_image(image: &DynamicImage) -> Self {
        Self {
            buffer: image.to_rgba8(),
        }
    }

    /// Returns the width of the surface in pixels.
    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    /// Returns the height of the surface in pixels.
    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    /// Returns `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    /// Fills the entire surface with a solid color.
    pub fn fill(&mut self, color: Rgba<u8>) {
        for pixel in self.buffer.pixels_mut() {
            *pixel = color;
        }
    }

    /// Blits `source` scaled to `(dest_width, dest_height)` at
    /// `(dest_x, dest_y)`. Regions falling outside the surface are clipped,
    /// not an error; a zero target size is a no-op.
    ///
    /// A 1:1 blit skips resampling entirely and is pixel-exact. Scaled blits
    /// go through the `image` crate's triangle filter.
    pub fn draw_image<I>(
        &mut self,
        source: &I,
        dest_x: i64,
        dest_y: i64,
        dest_width: u32,
        dest_height: u32,
    ) where
        I: GenericImageView<Pixel = Rgba<u8>>,
    {
        if dest_width == 0 || dest_height == 0 {
            return;
        }
        if source.dimensions() == (dest_width, dest_height) {
            imageops::overlay(&mut self.buffer, source, dest_x, dest_y);
        } else {
            let scaled = imageops::resize(
                source,
                dest_width,
                dest_height,
                imageops::FilterType::Triangle,
            );
            imageops::overlay(&mut self.buffer, &scaled, dest_x, dest_y);
        }
    }

    /// Returns a new surface containing exactly the requested pixel region.
    ///
    /// # Errors
    /// Returns [`GridError::OutOfBounds`] if the region is not fully
    /// contained in this surface, and [`GridError::InvalidDimension`] if the
    /// region is empty.
    ///
    /// # Example
    /// ```
    /// use gridcut::Surface;
    ///
    /// let surface = Surface::create(10, 10).unwrap();
    /// let cropped = surface.crop(2, 2, 4, 4).unwrap();
    /// assert_eq!(cropped.dimensions(), (4, 4));
    /// assert!(surface.crop(8, 8, 4, 4).is_err());
    /// ```
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Result<Self, GridError> {
        if width == 0 || height == 0 {
            return Err(GridError::InvalidDimension { width, height });
        }
        let (surface_width, surface_height) = self.buffer.dimensions();
        let right = x.checked_add(width);
        let bottom = y.checked_add(height);
        if right.map_or(true, |r| r > surface_width) || bottom.map_or(true, |b| b > surface_height) {
            error!(
                "Crop region out of bounds: x={}, y={}, width={}, height={}",
                x, y, width, height
            );
            return Err(GridError::OutOfBounds {
                x,
                y,
                width,
                height,
            });
        }
        Ok(Self {
            buffer: imageops::crop_imm(&self.buffer, x, y, width, height).to_image(),
        })
    }

    /// Serializes the pixel content to an encoded image format.
    ///
    /// The pixel content is the invariant here; exact bytes may vary across
    /// encoder versions.
    ///
    /// # Errors
    /// Returns [`GridError::EncodingFailure`] if the codec rejects the
    /// buffer.
    pub fn encode(&self, format: ImageFormat) -> Result<Vec<u8>, GridError> {
        let mut bytes = Cursor::new(Vec::new());
        self.buffer
            .write_to(&mut bytes, format)
            .map_err(|e| GridError::EncodingFailure(e.to_string()))?;
        Ok(bytes.into_inner())
    }

    /// Borrows the underlying pixel buffer.
    pub fn as_image(&self) -> &RgbaImage {
        &self.buffer
    }

    /// Consumes the surface, returning the underlying pixel buffer.
    pub fn into_image(self) -> RgbaImage {
        self.buffer
    }
}

impl From<RgbaImage> for Surface {
    fn from(buffer: RgbaImage) -> Self {
        Self { buffer }
    }
}
