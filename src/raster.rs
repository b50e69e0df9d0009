use ab_glyph::{point, Font, FontVec, PxScale, ScaleFont};
use image::{DynamicImage, Rgb, RgbImage};
use std::fs;
use std::path::PathBuf;
use walkdir::WalkDir;

use crate::error::{ConvertError, Result};
use crate::palette::Palette;

/// Vertical squeeze compensating for glyphs being taller than wide; a 1:1
/// pixel-to-character mapping would stretch the image vertically.
pub const CHAR_ASPECT: f32 = 0.45;
/// Horizontal advance of a monospace glyph, in em.
pub const GLYPH_WIDTH_RATIO: f32 = 0.6;
/// Row pitch of a rendered text line, in em.
pub const LINE_HEIGHT_RATIO: f32 = 1.2;
/// Padding around the rendered text block, per side.
pub const MARGIN_PX: u32 = 10;

/// Classic green-phosphor foreground on solid black.
const FOREGROUND: Rgb<u8> = Rgb([0, 255, 0]);
const BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);

/// One rasterized frame as a rectangular grid of palette characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterGrid {
    rows: Vec<Vec<char>>,
}

impl CharacterGrid {
    pub fn rows(&self) -> &[Vec<char>] {
        &self.rows
    }

    /// Character columns (identical for every row).
    pub fn width(&self) -> usize {
        self.rows.first().map(|r| r.len()).unwrap_or(0)
    }

    /// Character rows.
    pub fn height(&self) -> usize {
        self.rows.len()
    }
}

/// Grid height for a given target width and source frame dimensions.
pub fn grid_height(width: u32, src_width: u32, src_height: u32) -> u32 {
    let aspect = src_height as f32 / src_width as f32;
    (width as f32 * aspect * CHAR_ASPECT).round() as u32
}

/// Convert one decoded frame into a character grid.
///
/// The frame is resized to `width x grid_height(..)`, reduced to luminance
/// with the standard luma weights, contrast-scaled with clamping, and each
/// value mapped to a palette character.
pub fn to_character_grid(
    frame: &RgbImage,
    width: u32,
    palette: &Palette,
    contrast: f32,
) -> Result<CharacterGrid> {
    let (src_w, src_h) = frame.dimensions();
    if width == 0 || src_w == 0 || src_h == 0 {
        return Err(ConvertError::InvalidDimension(format!(
            "target width {} for {}x{} source",
            width, src_w, src_h
        )));
    }
    let height = grid_height(width, src_w, src_h);
    if height == 0 {
        return Err(ConvertError::InvalidDimension(format!(
            "computed character height is zero for width {} and {}x{} source",
            width, src_w, src_h
        )));
    }

    let resized = DynamicImage::ImageRgb8(frame.clone())
        .resize_exact(width, height, image::imageops::FilterType::Lanczos3)
        .to_rgb8();

    let mut rows = Vec::with_capacity(height as usize);
    for y in 0..height {
        let mut row = Vec::with_capacity(width as usize);
        for x in 0..width {
            let l = luminance(*resized.get_pixel(x, y));
            let adjusted = (l as f32 * contrast).clamp(0.0, 255.0) as u8;
            row.push(palette.char_for(adjusted));
        }
        rows.push(row);
    }
    Ok(CharacterGrid { rows })
}

fn luminance(rgb: Rgb<u8>) -> u8 {
    let r = rgb[0] as f64;
    let g = rgb[1] as f64;
    let b = rgb[2] as f64;
    (0.2126 * r + 0.7152 * g + 0.0722 * b) as u8
}

/// Pixel size of the image produced by [`render`] for a grid and font size.
pub fn rendered_size(grid: &CharacterGrid, font_size: u32) -> (u32, u32) {
    let w = (grid.width() as f32 * font_size as f32 * GLYPH_WIDTH_RATIO).round() as u32
        + 2 * MARGIN_PX;
    let h = (grid.height() as f32 * font_size as f32 * LINE_HEIGHT_RATIO).round() as u32
        + 2 * MARGIN_PX;
    (w, h)
}

/// Draw a character grid back into a pixel image: black background, lime
/// text, one grid row per text line at fixed pitch.
pub fn render(grid: &CharacterGrid, font_size: u32, painter: &GlyphPainter) -> RgbImage {
    let (img_w, img_h) = rendered_size(grid, font_size);
    let mut img = RgbImage::from_pixel(img_w, img_h, BACKGROUND);

    let pitch = (font_size as f32 * LINE_HEIGHT_RATIO).round() as u32;
    let advance = font_size as f32 * GLYPH_WIDTH_RATIO;

    for (row_idx, row) in grid.rows().iter().enumerate() {
        let top = MARGIN_PX + row_idx as u32 * pitch;
        for (col_idx, &ch) in row.iter().enumerate() {
            if ch == ' ' {
                continue;
            }
            let x = MARGIN_PX as f32 + col_idx as f32 * advance;
            painter.draw(&mut img, ch, x, top, font_size, advance);
        }
    }
    img
}

/// Ordered monospace font file candidates. The first three are the names
/// the tool has always looked for; the rest cover common Linux and macOS
/// installs so output stays deterministic wherever one of them exists.
const FONT_FILE_CANDIDATES: &[&str] = &[
    "consola.ttf",
    "cour.ttf",
    "arial.ttf",
    "DejaVuSansMono.ttf",
    "LiberationMono-Regular.ttf",
    "NotoSansMono-Regular.ttf",
];

fn font_dirs() -> Vec<PathBuf> {
    let mut roots = vec![
        PathBuf::from("C:\\Windows\\Fonts"),
        PathBuf::from("/usr/share/fonts"),
        PathBuf::from("/usr/local/share/fonts"),
        PathBuf::from("/System/Library/Fonts"),
        PathBuf::from("/Library/Fonts"),
    ];
    if let Some(home) = dirs::home_dir() {
        roots.push(home.join(".fonts"));
        roots.push(home.join("Library/Fonts"));
    }
    roots
}

/// Renders single glyphs into the frame image.
///
/// Either a real vector font found on the system, or a built-in block
/// painter used when none of the candidates is installed. Resolution never
/// fails; the block painter keeps output well formed (if crude) on bare
/// environments.
pub enum GlyphPainter {
    Outline(FontVec),
    Blocks,
}

impl GlyphPainter {
    /// Resolve a font by walking the candidate list in order across the
    /// platform font directories; fall back to the block painter.
    pub fn resolve() -> Self {
        for candidate in FONT_FILE_CANDIDATES {
            for dir in font_dirs() {
                if !dir.is_dir() {
                    continue;
                }
                let found = WalkDir::new(&dir)
                    .max_depth(4)
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .find(|e| {
                        e.file_type().is_file()
                            && e.file_name()
                                .to_str()
                                .is_some_and(|n| n.eq_ignore_ascii_case(candidate))
                    });
                if let Some(entry) = found {
                    if let Ok(bytes) = fs::read(entry.path()) {
                        if let Ok(font) = FontVec::try_from_vec(bytes) {
                            return GlyphPainter::Outline(font);
                        }
                    }
                }
            }
        }
        GlyphPainter::Blocks
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, GlyphPainter::Blocks)
    }

    fn draw(&self, img: &mut RgbImage, ch: char, x: f32, top: u32, font_size: u32, advance: f32) {
        match self {
            GlyphPainter::Outline(font) => {
                let scale = PxScale::from(font_size as f32);
                let scaled = font.as_scaled(scale);
                let baseline = top as f32 + scaled.ascent();
                let glyph = font
                    .glyph_id(ch)
                    .with_scale_and_position(scale, point(x, baseline));
                if let Some(outlined) = font.outline_glyph(glyph) {
                    let bounds = outlined.px_bounds();
                    let (img_w, img_h) = img.dimensions();
                    outlined.draw(|gx, gy, coverage| {
                        let px = bounds.min.x as i32 + gx as i32;
                        let py = bounds.min.y as i32 + gy as i32;
                        if px < 0 || py < 0 || px as u32 >= img_w || py as u32 >= img_h {
                            return;
                        }
                        let c = coverage.clamp(0.0, 1.0);
                        let pixel = img.get_pixel_mut(px as u32, py as u32);
                        *pixel = Rgb([
                            blend(pixel[0], FOREGROUND[0], c),
                            blend(pixel[1], FOREGROUND[1], c),
                            blend(pixel[2], FOREGROUND[2], c),
                        ]);
                    });
                }
            }
            GlyphPainter::Blocks => {
                // Solid cell with a 1px gap so adjacent rows stay readable.
                let (img_w, img_h) = img.dimensions();
                let x0 = x as u32;
                let x1 = ((x + advance) as u32).saturating_sub(1).min(img_w);
                let y1 = (top + font_size).saturating_sub(1).min(img_h);
                for py in top..y1 {
                    for px in x0..x1 {
                        img.put_pixel(px, py, FOREGROUND);
                    }
                }
            }
        }
    }
}

fn blend(under: u8, over: u8, coverage: f32) -> u8 {
    (under as f32 * (1.0 - coverage) + over as f32 * coverage) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray(w: u32, h: u32, v: u8) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([v, v, v]))
    }

    #[test]
    fn grid_height_formula() {
        // 2x2 source, width 2: round(2 * 1.0 * 0.45) = 1
        assert_eq!(grid_height(2, 2, 2), 1);
        // 16:9 source at 80 columns: round(80 * 0.5625 * 0.45) = 20
        assert_eq!(grid_height(80, 1920, 1080), 20);
        // Stable across repeated calls
        assert_eq!(grid_height(80, 1920, 1080), grid_height(80, 1920, 1080));
    }

    #[test]
    fn uniform_source_yields_uniform_grid() {
        let palette = Palette::from_chars("bw", "@ ").unwrap();
        let frame = gray(2, 2, 128);
        let grid = to_character_grid(&frame, 2, &palette, 1.0).unwrap();
        assert_eq!(grid.width(), 2);
        assert_eq!(grid.height(), 1);
        let first = grid.rows()[0][0];
        for row in grid.rows() {
            assert_eq!(row.len(), 2);
            for &c in row {
                assert_eq!(c, first);
            }
        }
    }

    #[test]
    fn zero_width_is_invalid() {
        let palette = Palette::by_name("detailed").unwrap();
        let frame = gray(4, 4, 100);
        assert!(matches!(
            to_character_grid(&frame, 0, &palette, 1.0),
            Err(ConvertError::InvalidDimension(_))
        ));
    }

    #[test]
    fn degenerate_height_is_invalid() {
        let palette = Palette::by_name("detailed").unwrap();
        // 100x1 source at width 1: round(1 * 0.01 * 0.45) = 0 rows
        let frame = gray(100, 1, 100);
        assert!(matches!(
            to_character_grid(&frame, 1, &palette, 1.0),
            Err(ConvertError::InvalidDimension(_))
        ));
    }

    #[test]
    fn contrast_saturates() {
        let palette = Palette::from_chars("bw", "@ ").unwrap();
        let frame = gray(2, 2, 200);
        // 200 * 10 clamps to 255 -> lightest character
        let grid = to_character_grid(&frame, 2, &palette, 10.0).unwrap();
        assert_eq!(grid.rows()[0][0], ' ');
        // 200 * 0.1 = 20 -> darkest character
        let grid = to_character_grid(&frame, 2, &palette, 0.1).unwrap();
        assert_eq!(grid.rows()[0][0], '@');
    }

    #[test]
    fn rendered_size_formula() {
        let palette = Palette::from_chars("bw", "@ ").unwrap();
        let grid = to_character_grid(&gray(2, 2, 0), 2, &palette, 1.0).unwrap();
        // width: round(2 * 10 * 0.6) + 20 = 32, height: round(1 * 10 * 1.2) + 20 = 32
        assert_eq!(rendered_size(&grid, 10), (32, 32));
    }

    #[test]
    fn render_never_fails_without_fonts() {
        let palette = Palette::from_chars("bw", "@ ").unwrap();
        let grid = to_character_grid(&gray(4, 4, 0), 4, &palette, 1.0).unwrap();
        // Force the fallback painter so the test does not depend on
        // installed fonts.
        let img = render(&grid, 12, &GlyphPainter::Blocks);
        let expected = rendered_size(&grid, 12);
        assert_eq!(img.dimensions(), expected);
        // Dark input maps to '@' everywhere, so some foreground must exist.
        assert!(img.pixels().any(|p| *p == Rgb([0, 255, 0])));
    }

    #[test]
    fn spaces_render_as_background() {
        let palette = Palette::from_chars("bw", "@ ").unwrap();
        // Bright input -> all spaces -> fully black frame.
        let grid = to_character_grid(&gray(4, 4, 255), 4, &palette, 1.0).unwrap();
        let img = render(&grid, 12, &GlyphPainter::Blocks);
        assert!(img.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }
}
