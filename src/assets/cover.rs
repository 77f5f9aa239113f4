use crate::assets::PartialFile;
use crate::ConvertError;
use image::{DynamicImage, ImageFormat, RgbImage};
use std::path::Path;

/// Write a square JPEG cover of at most `size` pixels to `target`.
///
/// Falls back to a black placeholder when `source` is missing or unreadable.
/// The image is written next to `target` first and renamed once complete.
pub fn convert(source: Option<&Path>, target: &Path, size: u32) -> Result<(), ConvertError> {
    if target.exists() {
        log::debug!("Reusing cover {}", target.display());
        return Ok(());
    }
    let cover = match source {
        Some(path) if path.is_file() => match square_thumbnail(path, size) {
            Ok(cover) => cover,
            Err(e) => {
                log::warn!("Unreadable cover {}: {e}", path.display());
                placeholder(size)
            }
        },
        Some(path) => {
            log::warn!("Cover {} not found", path.display());
            placeholder(size)
        }
        None => placeholder(size),
    };
    let mut partial = PartialFile::new(target.with_extension("part.jpg"));
    cover
        .save_with_format(&partial.path, ImageFormat::Jpeg)
        .map_err(|e| ConvertError::Asset(format!("could not write {}: {e}", target.display())))?;
    std::fs::rename(&partial.path, target)?;
    partial.keep = true;
    Ok(())
}

/// Center crop to a square, then shrink to `size`
fn square_thumbnail(path: &Path, size: u32) -> Result<DynamicImage, image::ImageError> {
    let image = DynamicImage::ImageRgb8(image::open(path)?.to_rgb8());
    let (width, height) = (image.width(), image.height());
    let side = width.min(height);
    let square = image.crop_imm((width - side) / 2, (height - side) / 2, side, side);
    if side > size {
        Ok(square.thumbnail(size, size))
    } else {
        Ok(square)
    }
}

fn placeholder(size: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::new(size, size))
}
