//! Overlay construction: two refined sources stacked, rotated and faded.

use crate::config::CompositionConfig;
use crate::error::{ComposeError, ComposeResult};
use crate::utils::images::{
    adjust_alpha, paste_masked, refine_by_ratio, refine_by_size, rotate_expand, strip_image,
};
use image::RgbaImage;
use serde::Deserialize;

/// How the two source images are stacked
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    #[default]
    Vertical,
    /// Accepted by the parser so it can be reported, never composed
    Horizontal,
}

/// Stack `top` above `bottom` with `padding` rows between them
///
/// The canvas is as wide as the wider image and the narrower one is centred.
/// Both are pasted through their own alpha so transparent areas never
/// overwrite anything.
pub fn concat_vertical(top: &RgbaImage, bottom: &RgbaImage, padding: u32) -> RgbaImage {
    let width = top.width().max(bottom.width());
    let height = top.height() + padding + bottom.height();

    let mut canvas = RgbaImage::new(width, height);
    paste_masked(&mut canvas, top, i64::from((width - top.width()) / 2), 0);
    paste_masked(
        &mut canvas,
        bottom,
        i64::from((width - bottom.width()) / 2),
        i64::from(top.height() + padding),
    );

    canvas
}

/// Concatenate two images along `direction`
pub fn concat(
    first: &RgbaImage,
    second: &RgbaImage,
    padding: u32,
    direction: Direction,
) -> ComposeResult<RgbaImage> {
    match direction {
        Direction::Vertical => Ok(concat_vertical(first, second, padding)),
        Direction::Horizontal => Err(ComposeError::config(
            "horizontal concatenation is not supported, use \"vertical\"",
        )),
    }
}

/// Build the overlay raster from two decoded sources
///
/// Each source is stripped and resized, the pair is concatenated, rotated with
/// an expanding canvas, stripped again and finally faded when the alpha
/// percentage is below 100.
pub fn reduce(
    first: RgbaImage,
    second: RgbaImage,
    config: &CompositionConfig,
) -> ComposeResult<RgbaImage> {
    let [size1, size2] = config.image_sizes;

    let (first, second) = if config.scale_keeping_ratio {
        (
            refine_by_ratio(first, size1, config.scale_by, true, config.resample),
            refine_by_ratio(second, size2, config.scale_by, true, config.resample),
        )
    } else {
        (
            refine_by_size(first, size1, config.resample),
            refine_by_size(second, size2, config.resample),
        )
    };

    let stacked = concat(&first, &second, config.padding, config.direction)?;
    let rotated = rotate_expand(&stacked, config.angle, config.resample);

    let mut overlay = strip_image(rotated);
    if config.alpha < 100 {
        adjust_alpha(&mut overlay, config.alpha);
    }

    Ok(overlay)
}
