use crate::error::{ComposeError, ComposeResult};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use serde::Deserialize;
use std::path::Path;

/// Resampling filter shared by resizing and rotation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Resample {
    /// Nearest neighbour, keeps hard edges and exact colours
    #[default]
    Nearest,
    /// Bilinear (triangle) filtering
    Bilinear,
}

impl Resample {
    pub fn filter(self) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Bilinear => FilterType::Triangle,
        }
    }

    pub fn interpolation(self) -> Interpolation {
        match self {
            Self::Nearest => Interpolation::Nearest,
            Self::Bilinear => Interpolation::Bilinear,
        }
    }
}

/// Axis that stays fixed when resizing with the aspect ratio kept
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScaleAxis {
    /// Width is fixed, height is derived
    #[default]
    Horizontal,
    /// Height is fixed, width is derived
    Vertical,
}

/// Open and decode an image, promoting it to RGBA
///
/// Images without an alpha channel come back fully opaque.
pub fn load_image(path: &Path) -> ComposeResult<RgbaImage> {
    let img = image::open(path).map_err(|source| ComposeError::Decode {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(img.into_rgba8())
}

/// Tight bounds `(left, top, right, bottom)` of every pixel with a non-zero channel
///
/// `right` and `bottom` are exclusive. Returns `None` when no pixel qualifies.
pub fn stripped_bounds(img: &RgbaImage) -> Option<(u32, u32, u32, u32)> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return None;
    }

    let mut left = width;
    let mut top = height;
    let mut right = 0;
    let mut bottom = 0;

    for (index, pixel) in img.as_raw().chunks_exact(4).enumerate() {
        if pixel.iter().all(|&channel| channel == 0) {
            continue;
        }

        let x = (index % width as usize) as u32;
        let y = (index / width as usize) as u32;

        left = left.min(x);
        top = top.min(y);
        right = right.max(x + 1);
        bottom = bottom.max(y + 1);
    }

    if left >= right || top >= bottom {
        None
    } else {
        Some((left, top, right, bottom))
    }
}

/// Crop an image to the tight box of its non-zero pixels
///
/// A fully transparent image, or one whose content already touches every edge,
/// is returned as is.
pub fn strip_image(img: RgbaImage) -> RgbaImage {
    let (width, height) = img.dimensions();

    match stripped_bounds(&img) {
        None => img,
        Some((0, 0, right, bottom)) if right == width && bottom == height => img,
        Some((left, top, right, bottom)) => {
            imageops::crop_imm(&img, left, top, right - left, bottom - top).to_image()
        }
    }
}

fn resize_to(img: RgbaImage, width: u32, height: u32, resample: Resample) -> RgbaImage {
    let (width, height) = (width.max(1), height.max(1));
    if img.dimensions() == (width, height) {
        return img;
    }

    imageops::resize(&img, width, height, resample.filter())
}

/// Strip an image, then resize it to exactly `size`
pub fn refine_by_size(img: RgbaImage, size: (u32, u32), resample: Resample) -> RgbaImage {
    let stripped = strip_image(img);
    resize_to(stripped, size.0, size.1, resample)
}

/// Strip an image, then resize it with one dimension derived from the aspect ratio
///
/// With `keep_ratio` unset this behaves like [`refine_by_size`].
pub fn refine_by_ratio(
    img: RgbaImage,
    size: (u32, u32),
    scale_by: ScaleAxis,
    keep_ratio: bool,
    resample: Resample,
) -> RgbaImage {
    let stripped = strip_image(img);
    let (mut width, mut height) = size;

    if keep_ratio {
        let (w0, h0) = stripped.dimensions();
        if w0 > 0 && h0 > 0 {
            match scale_by {
                ScaleAxis::Horizontal => {
                    height = (u64::from(h0) * u64::from(width) / u64::from(w0)) as u32;
                }
                ScaleAxis::Vertical => {
                    width = (u64::from(w0) * u64::from(height) / u64::from(h0)) as u32;
                }
            }
        }
    }

    resize_to(stripped, width, height, resample)
}

/// Scale the alpha of every non-transparent pixel by `percent / 100`
///
/// Alpha is truncated, never increased, and fully transparent pixels are left alone.
pub fn adjust_alpha(img: &mut RgbaImage, percent: u32) {
    if percent >= 100 {
        return;
    }

    for pixel in img.chunks_exact_mut(4) {
        if pixel[3] == 0 {
            continue;
        }
        pixel[3] = (u32::from(pixel[3]) * percent / 100) as u8;
    }
}

fn mask_blend(src: u8, dst: u8, mask: u8) -> u8 {
    let mask = u16::from(mask);
    ((u16::from(src) * mask + u16::from(dst) * (255 - mask) + 127) / 255) as u8
}

/// Paste `src` onto `dst` at `(left, top)` using the source alpha as the mask
///
/// Transparent source pixels leave the destination untouched and opaque ones
/// replace it. Out of bounds pixels are clipped.
pub fn paste_masked(dst: &mut RgbaImage, src: &RgbaImage, left: i64, top: i64) {
    let (dst_width, dst_height) = (i64::from(dst.width()), i64::from(dst.height()));

    for (sx, sy, pixel) in src.enumerate_pixels() {
        let mask = pixel[3];
        if mask == 0 {
            continue;
        }

        let x = left + i64::from(sx);
        let y = top + i64::from(sy);
        if x < 0 || y < 0 || x >= dst_width || y >= dst_height {
            continue;
        }

        let target = dst.get_pixel_mut(x as u32, y as u32);
        if mask == 255 {
            *target = *pixel;
            continue;
        }

        for channel in 0..4 {
            target[channel] = mask_blend(pixel[channel], target[channel], mask);
        }
    }
}

/// Rotate counter-clockwise by `degrees` about the centre, growing the canvas to fit
pub fn rotate_expand(img: &RgbaImage, degrees: f32, resample: Resample) -> RgbaImage {
    let degrees = degrees.rem_euclid(360.0);

    // Quarter turns are exact, no resampling needed
    if degrees == 0.0 {
        return img.clone();
    } else if degrees == 90.0 {
        return imageops::rotate270(img);
    } else if degrees == 180.0 {
        return imageops::rotate180(img);
    } else if degrees == 270.0 {
        return imageops::rotate90(img);
    }

    let (width, height) = img.dimensions();
    let theta = degrees.to_radians();
    let (sin, cos) = theta.sin_cos();

    let expanded_width = (width as f32 * cos.abs() + height as f32 * sin.abs()).ceil() as u32;
    let expanded_height = (width as f32 * sin.abs() + height as f32 * cos.abs()).ceil() as u32;
    let expanded_width = expanded_width.max(width);
    let expanded_height = expanded_height.max(height);

    let mut canvas = RgbaImage::new(expanded_width, expanded_height);
    imageops::replace(
        &mut canvas,
        img,
        i64::from((expanded_width - width) / 2),
        i64::from((expanded_height - height) / 2),
    );

    // imageproc turns clockwise for positive angles
    rotate_about_center(
        &canvas,
        -theta,
        resample.interpolation(),
        Rgba([0, 0, 0, 0]),
    )
}
