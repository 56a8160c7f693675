use std::num::NonZeroU32;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use gridcut::{
    export, overlay, stitch, CutConfig, CutSession, GridSpec, LayoutMode, SlotGrid, StitchConfig,
    DEFAULT_BACKGROUND, DEFAULT_MAX_CUT_GRID, DEFAULT_MAX_STITCH_GRID,
};
use image::ImageFormat;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "gridcut",
    about = "Cut images into grids of pieces and stitch grids of images",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split an image into a rows x cols grid of pieces.
    Cut(CutArgs),
    /// Compose multiple images into one rows x cols grid.
    Stitch(StitchArgs),
}

#[derive(Args, Debug)]
struct CutArgs {
    /// The image to cut into pieces.
    source: PathBuf,

    /// Number of rows.
    rows: NonZeroU32,
    /// Number of columns.
    cols: NonZeroU32,

    /// Output folder for the pieces.
    output: PathBuf,

    /// Inclusive upper bound on rows and columns.
    #[arg(long, default_value_t = DEFAULT_MAX_CUT_GRID)]
    max_grid: u32,

    /// Extract pieces sequentially instead of in parallel.
    #[arg(long)]
    sequential: bool,

    /// Also save a preview of the source with the grid lines drawn on it.
    #[arg(long)]
    overlay: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct StitchArgs {
    /// Images to place into the grid in row-major order.
    images: Vec<PathBuf>,

    /// Number of rows.
    #[arg(short, long)]
    rows: NonZeroU32,
    /// Number of columns.
    #[arg(short, long)]
    cols: NonZeroU32,

    /// Place an image into a specific 0-based cell (repeatable; takes
    /// precedence over positional IMAGES).
    #[arg(long = "slot", value_name = "ROW,COL,PATH", value_parser = parse_slot)]
    slots: Vec<SlotArg>,

    /// Fit and center each image within its cell instead of stretching it.
    #[arg(long)]
    keep_aspect: bool,

    /// Output file for the composed image.
    #[arg(short, long, default_value = "stitched.png")]
    output: PathBuf,

    /// Inclusive upper bound on rows and columns.
    #[arg(long, default_value_t = DEFAULT_MAX_STITCH_GRID)]
    max_grid: u32,
}

#[derive(Clone, Debug)]
struct SlotArg {
    row: u32,
    col: u32,
    path: PathBuf,
}

fn parse_slot(value: &str) -> std::result::Result<SlotArg, String> {
    let mut parts = value.splitn(3, ',');
    let (Some(row), Some(col), Some(path)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(String::from("expected ROW,COL,PATH"));
    };
    let row = row
        .trim()
        .parse()
        .map_err(|_| format!("invalid row in {:?}", value))?;
    let col = col
        .trim()
        .parse()
        .map_err(|_| format!("invalid column in {:?}", value))?;
    Ok(SlotArg {
        row,
        col,
        path: PathBuf::from(path),
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    match Cli::parse().command {
        Command::Cut(args) => run_cut(&args),
        Command::Stitch(args) => run_stitch(&args),
    }
}

fn run_cut(args: &CutArgs) -> Result<()> {
    let image = gridcut::open_image(&args.source)
        .with_context(|| format!("Failed to open {:?}", args.source))?;
    let spec = GridSpec::new(args.rows.get(), args.cols.get());

    if let Some(overlay_path) = &args.overlay {
        overlay::save_image_with_overlay(
            &image,
            &spec,
            overlay_path,
            &overlay::OverlayConfig::default(),
        )
        .context("Failed to save overlay preview")?;
    }

    let mut session = CutSession::new(CutConfig::new(
        args.max_grid,
        ImageFormat::Png,
        !args.sequential,
    ));
    session.set_image(image);
    let pieces = session.cut(spec).context("Failed to cut image")?;
    export::export_pieces(&pieces, &args.output).context("Failed to export pieces")?;

    println!("Wrote {} pieces to {}", pieces.len(), args.output.display());
    Ok(())
}

fn run_stitch(args: &StitchArgs) -> Result<()> {
    let spec = GridSpec::new(args.rows.get(), args.cols.get());

    let mut slots = SlotGrid::new();
    if args.slots.is_empty() {
        for (index, path) in args.images.iter().enumerate() {
            let image =
                gridcut::open_image(path).with_context(|| format!("Failed to open {:?}", path))?;
            let index = index as u32;
            slots.insert(index / spec.cols, index % spec.cols, image);
        }
    } else {
        for slot in &args.slots {
            let image = gridcut::open_image(&slot.path)
                .with_context(|| format!("Failed to open {:?}", slot.path))?;
            slots.insert(slot.row, slot.col, image);
        }
    }

    let mode = if args.keep_aspect {
        LayoutMode::AspectPreserve
    } else {
        LayoutMode::Stretch
    };
    let config = StitchConfig::new(args.max_grid, mode, DEFAULT_BACKGROUND, ImageFormat::Png);
    let composed = stitch(&slots, spec, &config).context("Failed to stitch images")?;
    export::export_composed(&composed, &args.output).context("Failed to write composed image")?;

    println!(
        "Wrote {}x{} composed image to {}",
        composed.surface.width(),
        composed.surface.height(),
        args.output.display()
    );
    Ok(())
}

/// Unit tests for the cutting and stitching logic.
#[cfg(test)]
mod tests {
    use gridcut::overlay::*;
    use gridcut::*;
    use image::*;
    use insta::assert_yaml_snapshot;
    use pretty_assertions::assert_eq;
    use proptest::{prelude::*, proptest};
    use test_case::test_case;

    const RED: [u8; 4] = [255, 0, 0, 255];
    const GREEN: [u8; 4] = [0, 255, 0, 255];
    const BLUE: [u8; 4] = [0, 0, 255, 255];
    const WHITE: [u8; 4] = [255, 255, 255, 255];

    fn solid(width: u32, height: u32, color: [u8; 4]) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba(color)))
    }

    /// Every pixel gets a distinct color so offset mistakes show up.
    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255])
        }))
    }

    #[test_case(1, 1)]
    #[test_case(2, 3)]
    #[test_case(4, 4)]
    #[test_case(20, 20)]
    fn test_cut_piece_grid_is_complete(rows: u32, cols: u32) {
        let img = gradient(40, 40);
        let pieces = cut_image(&img, GridSpec::new(rows, cols), &CutConfig::default()).unwrap();

        assert_eq!(pieces.len(), (rows * cols) as usize);
        for piece in &pieces {
            assert_eq!(piece.surface.dimensions(), (40 / cols, 40 / rows));
        }
    }

    #[test]
    fn test_cut_pieces_are_sorted_row_major() {
        let img = gradient(30, 20);
        let pieces = cut_image(&img, GridSpec::new(2, 3), &CutConfig::default()).unwrap();

        let labels: Vec<(u32, u32)> = pieces.iter().map(|p| (p.row, p.col)).collect();
        assert_eq!(labels, vec![(1, 1), (1, 2), (1, 3), (2, 1), (2, 2), (2, 3)]);
        assert_eq!(pieces[3].filename, "piece_2_1.png");
    }

    #[test]
    fn test_cut_pieces_reassemble_into_source() {
        let img = gradient(10, 10);
        let pieces = cut_image(&img, GridSpec::new(3, 3), &CutConfig::default()).unwrap();

        // 10 does not divide by 3: pieces cover everything except the one
        // trailing pixel per axis.
        let source = img.to_rgba8();
        for piece in &pieces {
            let origin_x = (piece.col - 1) * 3;
            let origin_y = (piece.row - 1) * 3;
            for (x, y, pixel) in piece.surface.as_image().enumerate_pixels() {
                assert_eq!(pixel, source.get_pixel(origin_x + x, origin_y + y));
            }
        }
    }

    #[test_case(0, 5)]
    #[test_case(5, 0)]
    #[test_case(21, 5)]
    #[test_case(5, 21)]
    fn test_cut_rejects_out_of_bounds_spec(rows: u32, cols: u32) {
        let img = gradient(40, 40);
        let result = cut_image(&img, GridSpec::new(rows, cols), &CutConfig::default());
        assert!(matches!(result, Err(GridError::InvalidGridSpec { .. })));
    }

    #[test]
    fn test_cut_rejects_cells_smaller_than_one_pixel() {
        let img = gradient(5, 5);
        let result = cut_image(&img, GridSpec::new(10, 10), &CutConfig::default());
        assert!(matches!(result, Err(GridError::InvalidDimension { .. })));
    }

    #[test]
    fn test_session_requires_a_loaded_image() {
        let session = CutSession::default();
        assert!(matches!(
            session.cut(GridSpec::new(2, 2)),
            Err(GridError::NoImageLoaded)
        ));
    }

    #[test]
    fn test_session_load_and_clear() {
        let mut session = CutSession::default();
        let encoded = Surface::from_image(&gradient(8, 8))
            .encode(ImageFormat::Png)
            .unwrap();

        session.load_image(&encoded).unwrap();
        assert!(session.image().is_some());
        assert_eq!(session.cut(GridSpec::new(2, 2)).unwrap().len(), 4);

        assert!(session.clear_image().is_some());
        assert!(matches!(
            session.cut(GridSpec::new(2, 2)),
            Err(GridError::NoImageLoaded)
        ));
    }

    #[test]
    fn test_cut_is_idempotent_on_pixel_content() {
        let img = gradient(16, 16);
        let spec = GridSpec::new(4, 2);
        let first = cut_image(&img, spec, &CutConfig::default()).unwrap();
        let second = cut_image(&img, spec, &CutConfig::default()).unwrap();

        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.surface, b.surface);
            assert_eq!(a.filename, b.filename);
        }
    }

    #[test]
    fn test_parallel_and_sequential_cuts_match() {
        let img = gradient(24, 24);
        let spec = GridSpec::new(3, 4);
        let parallel = cut_image(&img, spec, &CutConfig::new(20, ImageFormat::Png, true)).unwrap();
        let sequential =
            cut_image(&img, spec, &CutConfig::new(20, ImageFormat::Png, false)).unwrap();

        assert_eq!(parallel.len(), sequential.len());
        for (a, b) in parallel.iter().zip(&sequential) {
            assert_eq!(a.surface, b.surface);
            assert_eq!(a.filename, b.filename);
        }
    }

    #[test]
    fn test_piece_filename_follows_format() {
        assert_eq!(piece_filename(2, 3, ImageFormat::Png), "piece_2_3.png");
        assert_eq!(piece_filename(1, 1, ImageFormat::Jpeg), "piece_1_1.jpg");
    }

    #[test]
    fn test_piece_info_inline_snapshot() {
        let img = gradient(8, 4);
        let pieces = cut_image(&img, GridSpec::new(1, 2), &CutConfig::default()).unwrap();
        let infos: Vec<_> = pieces.iter().map(Piece::info).collect();

        assert_yaml_snapshot!(infos, @r###"
        - row: 1
          col: 1
          width: 4
          height: 4
          filename: piece_1_1.png
        - row: 1
          col: 2
          width: 4
          height: 4
          filename: piece_1_2.png
        "###);
    }

    #[test]
    fn test_piece_info_snapshot_with_redactions() {
        let img = gradient(9, 9);
        let pieces = cut_image(&img, GridSpec::new(2, 1), &CutConfig::default()).unwrap();
        let infos: Vec<_> = pieces.iter().map(Piece::info).collect();

        assert_yaml_snapshot!(infos, {
            "[].filename" => "[filename]",
        }, @r###"
        - row: 1
          col: 1
          width: 9
          height: 4
          filename: "[filename]"
        - row: 2
          col: 1
          width: 9
          height: 4
          filename: "[filename]"
        "###);
    }

    #[test]
    fn test_decode_rejects_non_image_bytes() {
        assert!(matches!(
            decode_image(b"not an image"),
            Err(GridError::InvalidImageFormat(_))
        ));
    }

    #[test]
    fn test_stitch_rejects_empty_grid() {
        let slots = SlotGrid::new();
        let result = stitch(&slots, GridSpec::new(2, 2), &StitchConfig::default());
        assert!(matches!(result, Err(GridError::EmptyGrid)));
    }

    #[test]
    fn test_stitch_rejects_out_of_bounds_spec() {
        let mut slots = SlotGrid::new();
        slots.insert(0, 0, solid(4, 4, RED));
        let result = stitch(&slots, GridSpec::new(11, 1), &StitchConfig::default());
        assert!(matches!(
            result,
            Err(GridError::InvalidGridSpec { max: 10, .. })
        ));
    }

    #[test]
    fn test_stitch_stretch_uses_average_cell_size() {
        let mut slots = SlotGrid::new();
        slots.insert(0, 0, solid(100, 50, RED));
        slots.insert(0, 1, solid(200, 100, BLUE));
        let composed = stitch(&slots, GridSpec::new(1, 2), &StitchConfig::default()).unwrap();

        assert_eq!((composed.cell_width, composed.cell_height), (150, 75));
        assert_eq!(composed.surface.dimensions(), (300, 75));

        // Each image is stretched to exactly fill its cell.
        let canvas = composed.surface.as_image();
        assert_eq!(canvas.get_pixel(0, 0), &Rgba(RED));
        assert_eq!(canvas.get_pixel(149, 74), &Rgba(RED));
        assert_eq!(canvas.get_pixel(150, 0), &Rgba(BLUE));
        assert_eq!(canvas.get_pixel(299, 74), &Rgba(BLUE));
    }

    #[test]
    fn test_stitch_aspect_preserve_uses_max_cell_size() {
        let mut slots = SlotGrid::new();
        slots.insert(0, 0, solid(100, 50, RED));
        slots.insert(0, 1, solid(200, 100, BLUE));
        let config = StitchConfig::new(
            10,
            LayoutMode::AspectPreserve,
            DEFAULT_BACKGROUND,
            ImageFormat::Png,
        );
        let composed = stitch(&slots, GridSpec::new(1, 2), &config).unwrap();

        assert_eq!((composed.cell_width, composed.cell_height), (200, 100));
        assert_eq!(composed.surface.dimensions(), (400, 100));

        // The 100x50 image scales by exactly 2 and fills its cell with no
        // padding.
        let canvas = composed.surface.as_image();
        assert_eq!(canvas.get_pixel(0, 0), &Rgba(RED));
        assert_eq!(canvas.get_pixel(199, 99), &Rgba(RED));
        assert_eq!(canvas.get_pixel(200, 0), &Rgba(BLUE));
    }

    #[test]
    fn test_stitch_aspect_preserve_centers_with_padding() {
        let mut slots = SlotGrid::new();
        slots.insert(0, 0, solid(100, 100, GREEN));
        slots.insert(0, 1, solid(200, 100, BLUE));
        let config = StitchConfig::new(
            10,
            LayoutMode::AspectPreserve,
            DEFAULT_BACKGROUND,
            ImageFormat::Png,
        );
        let composed = stitch(&slots, GridSpec::new(1, 2), &config).unwrap();

        // Cell 200x100: the square image scales by min(2, 1) = 1 and sits
        // at x = 50..150 with 50px of background on each side.
        let canvas = composed.surface.as_image();
        assert_eq!(canvas.get_pixel(49, 50), &Rgba(WHITE));
        assert_eq!(canvas.get_pixel(50, 50), &Rgba(GREEN));
        assert_eq!(canvas.get_pixel(149, 50), &Rgba(GREEN));
        assert_eq!(canvas.get_pixel(150, 50), &Rgba(WHITE));
    }

    #[test]
    fn test_stitch_leaves_unpopulated_cells_background() {
        let mut slots = SlotGrid::new();
        slots.insert(1, 1, solid(10, 10, RED));
        let composed = stitch(&slots, GridSpec::new(2, 2), &StitchConfig::default()).unwrap();

        assert_eq!(composed.surface.dimensions(), (20, 20));
        let canvas = composed.surface.as_image();
        assert_eq!(canvas.get_pixel(0, 0), &Rgba(WHITE));
        assert_eq!(canvas.get_pixel(19, 19), &Rgba(RED));
    }

    #[test]
    fn test_composed_encoded_bytes_decode_back() {
        let mut slots = SlotGrid::new();
        slots.insert(0, 0, solid(6, 6, RED));
        let composed = stitch(&slots, GridSpec::new(1, 1), &StitchConfig::default()).unwrap();

        let decoded = decode_image(&composed.encoded).unwrap();
        assert_eq!(decoded.dimensions(), (6, 6));
    }

    #[test]
    fn test_surface_create_rejects_zero_dimension() {
        assert!(matches!(
            Surface::create(0, 4),
            Err(GridError::InvalidDimension { .. })
        ));
        assert!(matches!(
            Surface::create(4, 0),
            Err(GridError::InvalidDimension { .. })
        ));
    }

    #[test]
    fn test_surface_crop_rejects_out_of_bounds_region() {
        let surface = Surface::create(10, 10).unwrap();
        assert!(matches!(
            surface.crop(8, 8, 4, 4),
            Err(GridError::OutOfBounds { .. })
        ));
        assert!(surface.crop(6, 6, 4, 4).is_ok());
    }

    #[test]
    fn test_surface_draw_image_clips_outside_bounds() {
        let mut surface = Surface::create(4, 4).unwrap();
        surface.fill(Rgba(WHITE));
        let stamp = RgbaImage::from_pixel(4, 4, Rgba(RED));

        surface.draw_image(&stamp, 2, 2, 4, 4); // overhangs bottom-right
        surface.draw_image(&stamp, -2, -2, 2, 2); // fully outside

        let canvas = surface.as_image();
        assert_eq!(canvas.get_pixel(0, 0), &Rgba(WHITE));
        assert_eq!(canvas.get_pixel(1, 1), &Rgba(WHITE));
        assert_eq!(canvas.get_pixel(2, 2), &Rgba(RED));
        assert_eq!(canvas.get_pixel(3, 3), &Rgba(RED));
    }

    #[test]
    fn test_overlay_fractions() {
        let spec = GridSpec::new(4, 2);
        assert_eq!(row_fractions(&spec).as_slice(), &[0.25, 0.5, 0.75]);
        assert_eq!(column_fractions(&spec).as_slice(), &[0.5]);

        // A single row or column has no interior boundary.
        assert!(row_fractions(&GridSpec::new(1, 5)).is_empty());
    }

    #[test]
    fn test_overlay_fractions_inline_snapshot() {
        let fractions = row_fractions(&GridSpec::new(4, 2));

        assert_yaml_snapshot!(fractions, @r###"
        - 0.25
        - 0.5
        - 0.75
        "###);
    }

    #[test]
    fn test_draw_grid_overlay_marks_lines() {
        let spec = GridSpec::new(2, 2);
        let mut img = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 255]));
        draw_grid_overlay(&mut img, &spec, &OverlayConfig::default());

        // Horizontal boundary at y = 5, vertical at x = 5; columns draw
        // over rows at the intersection.
        assert_eq!(img.get_pixel(0, 5), &Rgba([255, 0, 0, 255]));
        assert_eq!(img.get_pixel(5, 9), &Rgba([0, 0, 255, 255]));
        assert_eq!(img.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_save_image_with_overlay() {
        let img = solid(10, 10, WHITE);
        let output_path = std::env::temp_dir().join("gridcut_test_overlay.png");

        save_image_with_overlay(
            &img,
            &GridSpec::new(2, 2),
            &output_path,
            &OverlayConfig::default(),
        )
        .unwrap();

        assert!(output_path.exists());
        std::fs::remove_file(&output_path).unwrap();
    }

    #[test]
    fn test_export_pieces_writes_files() {
        let img = gradient(8, 8);
        let pieces = cut_image(&img, GridSpec::new(2, 2), &CutConfig::default()).unwrap();
        let dir = std::env::temp_dir().join("gridcut_test_export_pieces");

        export::export_pieces(&pieces, &dir).unwrap();
        for piece in &pieces {
            assert!(dir.join(&piece.filename).exists());
        }
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_parse_slot_argument() {
        let slot = super::parse_slot("1,2,img.png").unwrap();
        assert_eq!((slot.row, slot.col), (1, 2));
        assert_eq!(slot.path, std::path::PathBuf::from("img.png"));

        assert!(super::parse_slot("1,2").is_err());
        assert!(super::parse_slot("a,b,c.png").is_err());
    }

    proptest! {
        #[test]
        fn test_cut_grid_shape_proptest(
            rows in 1..=20u32,
            cols in 1..=20u32,
            width in 20..60u32,
            height in 20..60u32,
        ) {
            // Random pixel content; the shape invariants hold regardless.
            let img = DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |_, _| {
                Rgba([rand::random::<u8>(), rand::random::<u8>(), rand::random::<u8>(), 255])
            }));
            let pieces = cut_image(&img, GridSpec::new(rows, cols), &CutConfig::default()).unwrap();

            prop_assert_eq!(pieces.len(), (rows * cols) as usize);
            for piece in &pieces {
                prop_assert_eq!(piece.surface.dimensions(), (width / cols, height / rows));
            }
            for pair in pieces.windows(2) {
                prop_assert!((pair[0].row, pair[0].col) < (pair[1].row, pair[1].col));
            }
        }

        #[test]
        fn test_cut_reassembles_proptest(rows in 1..=8u32, cols in 1..=8u32) {
            let img = gradient(32, 32);
            let pieces = cut_image(&img, GridSpec::new(rows, cols), &CutConfig::default()).unwrap();

            let source = img.to_rgba8();
            let piece_width = 32 / cols;
            let piece_height = 32 / rows;
            for piece in &pieces {
                let origin_x = (piece.col - 1) * piece_width;
                let origin_y = (piece.row - 1) * piece_height;
                for (x, y, pixel) in piece.surface.as_image().enumerate_pixels() {
                    prop_assert_eq!(pixel, source.get_pixel(origin_x + x, origin_y + y));
                }
            }
        }

        #[test]
        fn test_stitch_canvas_size_proptest(
            rows in 1..=10u32,
            cols in 1..=10u32,
            width in 1..40u32,
            height in 1..40u32,
        ) {
            // A single populated slot makes the average its own dimensions.
            let mut slots = SlotGrid::new();
            slots.insert(0, 0, solid(width, height, RED));
            let composed = stitch(&slots, GridSpec::new(rows, cols), &StitchConfig::default()).unwrap();

            prop_assert_eq!(composed.surface.dimensions(), (width * cols, height * rows));
            prop_assert_eq!((composed.cell_width, composed.cell_height), (width, height));
        }
    }
}
