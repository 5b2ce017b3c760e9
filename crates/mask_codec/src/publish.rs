//! Export of a published (merged) label grid in the configured
//! encoding/format pair.
//!
//! Format/encoding compatibility is validated when the project
//! configuration is loaded; by the time a mask is published an
//! incompatible pair is a logic error, not a user error, but it is still
//! surfaced as [`CodecError::UnsupportedExport`] rather than a panic.

use std::path::Path;

use image::{GrayImage, ImageFormat, RgbImage, RgbaImage};
use ndarray::Array2;
use tilemark_common::{ClassDef, MaskEncoding, MaskFormat};
use tracing::info;

use crate::{CodecError, EncodedMask, Result, container, encode_for_storage};

/// Write a label grid to `path` in the given encoding and file format
pub fn publish_mask(
    path: impl AsRef<Path>,
    labels: &Array2<u8>,
    encoding: MaskEncoding,
    format: MaskFormat,
    classes: &[ClassDef],
) -> Result<()> {
    let path = path.as_ref();
    if !format.allowed_encodings().contains(&encoding) {
        return Err(CodecError::UnsupportedExport {
            encoding: encoding.to_string(),
            format: format.to_string(),
        });
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let encoded = encode_for_storage(labels, encoding, classes)?;
    match format {
        MaskFormat::Msk => container::write_mask_file(path, &encoded)?,
        MaskFormat::Png => save_image(path, &encoded, ImageFormat::Png)?,
        MaskFormat::Jpeg => save_image(path, &encoded, ImageFormat::Jpeg)?,
    }

    info!(path = %path.display(), %encoding, %format, "published mask");
    Ok(())
}

fn save_image(path: &Path, encoded: &EncodedMask, format: ImageFormat) -> Result<()> {
    match encoded {
        EncodedMask::Integer(labels) => {
            let (height, width) = labels.dim();
            let image = GrayImage::from_raw(
                width as u32,
                height as u32,
                labels.iter().copied().collect(),
            )
            .expect("buffer length matches dimensions");
            image.save_with_format(path, format)?;
        }
        EncodedMask::Rgb(pixels) => {
            let (height, width, _) = pixels.dim();
            let image = RgbImage::from_raw(
                width as u32,
                height as u32,
                pixels.iter().copied().collect(),
            )
            .expect("buffer length matches dimensions");
            image.save_with_format(path, format)?;
        }
        EncodedMask::Rgba(pixels) => {
            let (height, width, _) = pixels.dim();
            let image = RgbaImage::from_raw(
                width as u32,
                height as u32,
                pixels.iter().copied().collect(),
            )
            .expect("buffer length matches dimensions");
            image.save_with_format(path, format)?;
        }
        // One-hot layers have no image representation; the config
        // validator only pairs binary with the native container.
        EncodedMask::Binary(_) => {
            return Err(CodecError::UnsupportedExport {
                encoding: encoded.encoding().to_string(),
                format: format!("{format:?}"),
            });
        }
    }
    Ok(())
}
