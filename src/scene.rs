//! Background synthesis, overlay placement and persistence of a finished sample.

use crate::compose::reduce;
use crate::config::CompositionConfig;
use crate::error::{ComposeError, ComposeResult};
use crate::labels::Rect;
use crate::noise::{NoiseGenerator, ValueNoise};
use crate::utils::images::{load_image, paste_masked, Resample};
use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgba, RgbaImage};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Random pixels drawn onto a "simple" background
pub const SIMPLE_NOISE_POINTS: u32 = 10_000;

/// Complex textures are generated at most this large, then upscaled
pub const COMPLEX_NOISE_MAX_SIZE: (u32, u32) = (16, 16);

/// Where the background canvas comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Background {
    /// A picture on disk, resized to the canvas
    Image(PathBuf),
    /// Transparent canvas sprinkled with random opaque pixels
    SimpleNoise,
    /// Low resolution procedural texture, upscaled
    ComplexNoise,
}

/// Transparent canvas with up to `points` randomly placed, randomly coloured pixels
pub fn simple_noise_image(
    width: u32,
    height: u32,
    points: u32,
    rng: &mut dyn RngCore,
) -> RgbaImage {
    let mut img = RgbaImage::new(width, height);
    if width == 0 || height == 0 {
        return img;
    }

    for _ in 0..points {
        let x = rng.random_range(0..width);
        let y = rng.random_range(0..height);
        let color = Rgba([rng.random(), rng.random(), rng.random(), 255]);
        img.put_pixel(x, y, color);
    }

    img
}

/// Opaque procedural texture of exactly `width` x `height`
pub fn complex_noise_image(
    width: u32,
    height: u32,
    generator: &dyn NoiseGenerator,
    rng: &mut dyn RngCore,
) -> RgbaImage {
    let (max_width, max_height) = COMPLEX_NOISE_MAX_SIZE;
    let (grid_width, grid_height) = if width > max_width || height > max_height {
        (max_width, max_height)
    } else {
        (width, height)
    };

    let grid = generator.generate(grid_width, grid_height, rng);
    let mut img = RgbaImage::new(grid_width, grid_height);
    for (y, row) in grid.iter().enumerate().take(grid_height as usize) {
        for (x, color) in row.iter().enumerate().take(grid_width as usize) {
            img.put_pixel(x as u32, y as u32, Rgba([color[0], color[1], color[2], 255]));
        }
    }

    if (grid_width, grid_height) == (width, height) {
        img
    } else {
        imageops::resize(&img, width, height, FilterType::Triangle)
    }
}

/// Build the background canvas of exactly `size`
pub fn background(
    source: &Background,
    size: (u32, u32),
    resample: Resample,
    generator: &dyn NoiseGenerator,
    rng: &mut dyn RngCore,
) -> ComposeResult<RgbaImage> {
    let (width, height) = size;

    let canvas = match source {
        Background::Image(path) => {
            let img = load_image(path)?;
            if img.dimensions() == size {
                img
            } else {
                imageops::resize(&img, width, height, resample.filter())
            }
        }
        Background::SimpleNoise => simple_noise_image(width, height, SIMPLE_NOISE_POINTS, rng),
        Background::ComplexNoise => complex_noise_image(width, height, generator, rng),
    };

    Ok(canvas)
}

/// Straight-alpha "over": `src` drawn on top of `dst`
pub fn over(dst: [u8; 4], src: [u8; 4]) -> [u8; 4] {
    match src[3] {
        0 => return dst,
        255 => return src,
        _ => {}
    }

    let src_alpha = f32::from(src[3]) / 255.0;
    let dst_alpha = f32::from(dst[3]) / 255.0 * (1.0 - src_alpha);
    let out_alpha = src_alpha + dst_alpha;

    let mut out = [0u8; 4];
    for channel in 0..3 {
        let value = (f32::from(src[channel]) * src_alpha + f32::from(dst[channel]) * dst_alpha)
            / out_alpha;
        out[channel] = value.round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_alpha * 255.0).round().clamp(0.0, 255.0) as u8;
    out
}

/// Composite `layer` over `canvas` in place; both must share dimensions
pub fn alpha_composite(canvas: &mut RgbaImage, layer: &RgbaImage) -> ComposeResult<()> {
    if canvas.dimensions() != layer.dimensions() {
        return Err(ComposeError::config(format!(
            "cannot composite {:?} layer onto {:?} canvas",
            layer.dimensions(),
            canvas.dimensions()
        )));
    }

    for (dst, src) in canvas.pixels_mut().zip(layer.pixels()) {
        dst.0 = over(dst.0, src.0);
    }
    Ok(())
}

/// Place `overlay` on `background` at `(left, top)`, shifted so it stays on canvas
///
/// The offset moves left/up until the overlay fits and never goes negative. An
/// overlay larger than the canvas is cropped, and the returned rectangle is
/// clipped to the canvas as well.
pub fn place(
    mut background: RgbaImage,
    overlay: &RgbaImage,
    left: u32,
    top: u32,
) -> ComposeResult<(RgbaImage, Rect)> {
    let (bg_width, bg_height) = background.dimensions();

    let left = left.min(bg_width.saturating_sub(overlay.width()));
    let top = top.min(bg_height.saturating_sub(overlay.height()));

    let mut layer = RgbaImage::new(bg_width, bg_height);
    paste_masked(&mut layer, overlay, i64::from(left), i64::from(top));
    alpha_composite(&mut background, &layer)?;

    let rect = Rect {
        left,
        top,
        width: overlay.width().min(bg_width - left),
        height: overlay.height().min(bg_height - top),
    };

    Ok((background, rect))
}

/// Compose one sample with the default noise generator and save it as PNG
pub fn combine(
    saved_path: &Path,
    source1: &Path,
    source2: &Path,
    config: &CompositionConfig,
) -> ComposeResult<(RgbaImage, Rect)> {
    combine_with(saved_path, source1, source2, config, &ValueNoise::default())
}

/// Compose one sample: background, overlay, placement, then save as PNG
pub fn combine_with(
    saved_path: &Path,
    source1: &Path,
    source2: &Path,
    config: &CompositionConfig,
    generator: &dyn NoiseGenerator,
) -> ComposeResult<(RgbaImage, Rect)> {
    let mut rng = StdRng::seed_from_u64(config.noise_seed);
    let canvas = background(
        &config.background,
        config.background_size,
        config.resample,
        generator,
        &mut rng,
    )?;

    let overlay = reduce(load_image(source1)?, load_image(source2)?, config)?;
    let (left, top) = config.overlay_start;
    let (img, rect) = place(canvas, &overlay, left, top)?;

    img.save_with_format(saved_path, ImageFormat::Png)
        .map_err(|source| ComposeError::Encode {
            path: saved_path.to_path_buf(),
            source,
        })?;

    debug!(path = %saved_path.display(), ?rect, "sample saved");
    Ok((img, rect))
}
