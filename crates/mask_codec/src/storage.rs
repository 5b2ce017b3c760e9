use ndarray::{Array2, Array3};
use tilemark_common::{ClassDef, MaskEncoding};

use crate::{CodecError, Result};

/// A label grid in one of the persisted representations
#[derive(Debug, Clone, PartialEq)]
pub enum EncodedMask {
    /// One byte per pixel holding the class id
    Integer(Array2<u8>),
    /// One boolean layer per class, H x W x num_classes
    Binary(Array3<bool>),
    /// Class colours, H x W x 3
    Rgb(Array3<u8>),
    /// Class colours, H x W x 4
    Rgba(Array3<u8>),
}

impl EncodedMask {
    pub fn encoding(&self) -> MaskEncoding {
        match self {
            Self::Integer(_) => MaskEncoding::Integer,
            Self::Binary(_) => MaskEncoding::Binary,
            Self::Rgb(_) => MaskEncoding::Rgb,
            Self::Rgba(_) => MaskEncoding::Rgba,
        }
    }
}

/// Encode a label grid into one of the persisted representations.
///
/// Every class id occurring in the grid must have a class definition.
pub fn encode_for_storage(
    labels: &Array2<u8>,
    encoding: MaskEncoding,
    classes: &[ClassDef],
) -> Result<EncodedMask> {
    if let Some(&bad) = labels.iter().find(|&&id| id as usize >= classes.len()) {
        return Err(CodecError::UnknownClass(bad));
    }

    let (height, width) = labels.dim();
    match encoding {
        MaskEncoding::Integer => Ok(EncodedMask::Integer(labels.clone())),
        MaskEncoding::Binary => {
            let mut layers = Array3::from_elem((height, width, classes.len()), false);
            for ((row, col), &id) in labels.indexed_iter() {
                layers[[row, col, id as usize]] = true;
            }
            Ok(EncodedMask::Binary(layers))
        }
        MaskEncoding::Rgb => {
            let mut pixels = Array3::zeros((height, width, 3));
            for ((row, col), &id) in labels.indexed_iter() {
                let colour = classes[id as usize].colour;
                for channel in 0..3 {
                    pixels[[row, col, channel]] = colour[channel];
                }
            }
            Ok(EncodedMask::Rgb(pixels))
        }
        MaskEncoding::Rgba => {
            let mut pixels = Array3::zeros((height, width, 4));
            for ((row, col), &id) in labels.indexed_iter() {
                let colour = classes[id as usize].colour;
                for channel in 0..4 {
                    pixels[[row, col, channel]] = colour[channel];
                }
            }
            Ok(EncodedMask::Rgba(pixels))
        }
    }
}

/// Recover a label grid from a persisted representation.
///
/// `binary` decodes via arg-max over the class axis (first maximum wins);
/// `rgb`/`rgba` via inverse colour lookup against the class table.
pub fn decode_from_storage(encoded: &EncodedMask, classes: &[ClassDef]) -> Result<Array2<u8>> {
    match encoded {
        EncodedMask::Integer(labels) => {
            if let Some(&bad) = labels.iter().find(|&&id| id as usize >= classes.len()) {
                return Err(CodecError::UnknownClass(bad));
            }
            Ok(labels.clone())
        }
        EncodedMask::Binary(layers) => {
            let (height, width, num_classes) = layers.dim();
            let mut labels = Array2::zeros((height, width));
            for row in 0..height {
                for col in 0..width {
                    // Arg-max over the class axis; first set layer wins
                    let id = (0..num_classes)
                        .find(|&class| layers[[row, col, class]])
                        .unwrap_or(0);
                    labels[[row, col]] = id as u8;
                }
            }
            Ok(labels)
        }
        EncodedMask::Rgb(pixels) => decode_colours(pixels, classes, 3),
        EncodedMask::Rgba(pixels) => decode_colours(pixels, classes, 4),
    }
}

fn decode_colours(pixels: &Array3<u8>, classes: &[ClassDef], channels: usize) -> Result<Array2<u8>> {
    let (height, width, _) = pixels.dim();
    let mut labels = Array2::zeros((height, width));
    for row in 0..height {
        for col in 0..width {
            let mut colour = [0u8; 4];
            for channel in 0..channels {
                colour[channel] = pixels[[row, col, channel]];
            }
            let id = classes
                .iter()
                .find(|class| class.colour[..channels] == colour[..channels])
                .map(|class| class.id)
                .ok_or(CodecError::UnknownColour(colour))?;
            labels[[row, col]] = id;
        }
    }
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn classes() -> Vec<ClassDef> {
        vec![
            ClassDef::new(0, "Clear", [255, 255, 255, 0]),
            ClassDef::new(1, "Cloud", [255, 255, 0, 70]),
            ClassDef::new(2, "Shadow", [45, 45, 45, 70]),
        ]
    }

    #[test]
    fn test_binary_one_hot_round_trip() {
        let labels = array![[0u8, 1, 2], [2, 2, 0], [1, 0, 1]];
        let encoded = encode_for_storage(&labels, MaskEncoding::Binary, &classes()).unwrap();

        if let EncodedMask::Binary(layers) = &encoded {
            assert_eq!(layers.dim(), (3, 3, 3));
            // Exactly one layer set per pixel
            for row in 0..3 {
                for col in 0..3 {
                    let set = (0..3).filter(|&c| layers[[row, col, c]]).count();
                    assert_eq!(set, 1);
                }
            }
        } else {
            panic!("expected binary encoding");
        }

        let decoded = decode_from_storage(&encoded, &classes()).unwrap();
        assert_eq!(decoded, labels);
    }

    #[test]
    fn test_integer_is_identity() {
        let labels = array![[0u8, 2], [1, 1]];
        let encoded = encode_for_storage(&labels, MaskEncoding::Integer, &classes()).unwrap();
        let decoded = decode_from_storage(&encoded, &classes()).unwrap();
        assert_eq!(decoded, labels);
    }

    #[test]
    fn test_rgb_colour_lookup_round_trip() {
        let labels = array![[0u8, 1], [2, 0]];
        let encoded = encode_for_storage(&labels, MaskEncoding::Rgb, &classes()).unwrap();

        if let EncodedMask::Rgb(pixels) = &encoded {
            assert_eq!(pixels.dim(), (2, 2, 3));
            assert_eq!(pixels[[0, 1, 2]], 0); // Cloud blue channel
            assert_eq!(pixels[[1, 0, 0]], 45); // Shadow red channel
        } else {
            panic!("expected rgb encoding");
        }

        let decoded = decode_from_storage(&encoded, &classes()).unwrap();
        assert_eq!(decoded, labels);
    }

    #[test]
    fn test_rgba_keeps_alpha() {
        let labels = array![[1u8]];
        let encoded = encode_for_storage(&labels, MaskEncoding::Rgba, &classes()).unwrap();
        if let EncodedMask::Rgba(pixels) = &encoded {
            assert_eq!(pixels[[0, 0, 3]], 70);
        } else {
            panic!("expected rgba encoding");
        }
    }

    #[test]
    fn test_unknown_class_rejected() {
        let labels = array![[0u8, 9]];
        assert!(matches!(
            encode_for_storage(&labels, MaskEncoding::Binary, &classes()),
            Err(CodecError::UnknownClass(9))
        ));
    }

    #[test]
    fn test_unknown_colour_rejected() {
        let pixels = Array3::from_elem((1, 1, 3), 13u8);
        let encoded = EncodedMask::Rgb(pixels);
        assert!(matches!(
            decode_from_storage(&encoded, &classes()),
            Err(CodecError::UnknownColour(_))
        ));
    }
}
