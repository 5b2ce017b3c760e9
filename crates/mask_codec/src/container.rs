//! Tilemark's native on-disk mask container.
//!
//! Layout: `b"TMSK"`, version byte, encoding tag, three u32-LE dimensions
//! (height, width, channels), then the raw payload. Per-user masks are
//! persisted here with the one-hot `binary` encoding, the only layout with
//! a lossless round trip back to class ids.

use std::path::Path;

use ndarray::{Array2, Array3};
use tracing::debug;

use crate::{CodecError, EncodedMask, Result};

const CONTAINER_MAGIC: &[u8; 4] = b"TMSK";
const CONTAINER_VERSION: u8 = 1;

fn encoding_tag(encoded: &EncodedMask) -> u8 {
    match encoded {
        EncodedMask::Integer(_) => 0,
        EncodedMask::Binary(_) => 1,
        EncodedMask::Rgb(_) => 2,
        EncodedMask::Rgba(_) => 3,
    }
}

/// Serialize an encoded mask into container bytes
pub fn to_container_bytes(encoded: &EncodedMask) -> Vec<u8> {
    let (height, width, channels, payload): (usize, usize, usize, Vec<u8>) = match encoded {
        EncodedMask::Integer(labels) => {
            let (h, w) = labels.dim();
            (h, w, 1, labels.iter().copied().collect())
        }
        EncodedMask::Binary(layers) => {
            let (h, w, c) = layers.dim();
            (h, w, c, layers.iter().map(|&set| set as u8).collect())
        }
        EncodedMask::Rgb(pixels) => {
            let (h, w, c) = pixels.dim();
            (h, w, c, pixels.iter().copied().collect())
        }
        EncodedMask::Rgba(pixels) => {
            let (h, w, c) = pixels.dim();
            (h, w, c, pixels.iter().copied().collect())
        }
    };

    let mut bytes = Vec::with_capacity(18 + payload.len());
    bytes.extend_from_slice(CONTAINER_MAGIC);
    bytes.push(CONTAINER_VERSION);
    bytes.push(encoding_tag(encoded));
    bytes.extend_from_slice(&(height as u32).to_le_bytes());
    bytes.extend_from_slice(&(width as u32).to_le_bytes());
    bytes.extend_from_slice(&(channels as u32).to_le_bytes());
    bytes.extend_from_slice(&payload);
    bytes
}

/// Deserialize container bytes into an encoded mask
pub fn from_container_bytes(bytes: &[u8]) -> Result<EncodedMask> {
    if bytes.len() < 18 {
        return Err(CodecError::ContainerTruncated);
    }
    if &bytes[0..4] != CONTAINER_MAGIC {
        return Err(CodecError::BadContainerMagic);
    }
    if bytes[4] != CONTAINER_VERSION {
        return Err(CodecError::ContainerVersion(bytes[4]));
    }

    let tag = bytes[5];
    let read_dim = |offset: usize| {
        u32::from_le_bytes(bytes[offset..offset + 4].try_into().expect("4 bytes")) as usize
    };
    let (height, width, channels) = (read_dim(6), read_dim(10), read_dim(14));

    // Dims come from the file, so the product must not be trusted to fit
    let expected = height
        .checked_mul(width)
        .and_then(|pixels| pixels.checked_mul(channels))
        .ok_or(CodecError::ContainerTruncated)?;
    let payload = &bytes[18..];
    if payload.len() != expected {
        return Err(CodecError::ContainerTruncated);
    }

    match tag {
        0 => {
            if channels != 1 {
                return Err(CodecError::ContainerTruncated);
            }
            let labels = Array2::from_shape_vec((height, width), payload.to_vec())
                .expect("payload length checked above");
            Ok(EncodedMask::Integer(labels))
        }
        1 => {
            let layers = Array3::from_shape_vec(
                (height, width, channels),
                payload.iter().map(|&value| value != 0).collect(),
            )
            .expect("payload length checked above");
            Ok(EncodedMask::Binary(layers))
        }
        2 | 3 => {
            let expected_channels = if tag == 2 { 3 } else { 4 };
            if channels != expected_channels {
                return Err(CodecError::ContainerTruncated);
            }
            let pixels = Array3::from_shape_vec((height, width, channels), payload.to_vec())
                .expect("payload length checked above");
            Ok(if tag == 2 {
                EncodedMask::Rgb(pixels)
            } else {
                EncodedMask::Rgba(pixels)
            })
        }
        other => Err(CodecError::ContainerTag(other)),
    }
}

/// Write an encoded mask to a `.msk` file, creating parent directories
pub fn write_mask_file(path: impl AsRef<Path>, encoded: &EncodedMask) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    debug!(path = %path.display(), encoding = %encoded.encoding(), "writing mask file");
    std::fs::write(path, to_container_bytes(encoded))?;
    Ok(())
}

/// Read an encoded mask from a `.msk` file
pub fn read_mask_file(path: impl AsRef<Path>) -> Result<EncodedMask> {
    let bytes = std::fs::read(path.as_ref())?;
    from_container_bytes(&bytes)
}
