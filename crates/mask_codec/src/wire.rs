use ndarray::Array2;

use crate::{CodecError, Result};

/// Magic start/end marker of a wire mask payload
pub const WIRE_MAGIC: u8 = 254;

/// Encode a label grid plus its provenance grid into the wire layout.
///
/// Layout for a `h x w` mask (`len = h * w`):
///
/// ```text
/// byte 0            : 254
/// bytes 1..=len     : label grid, row-major, one class id per pixel
/// bytes len+1..=2len: provenance grid, row-major, 0 = model / 1 = human
/// byte 2len+1       : 254
/// ```
pub fn encode_wire(labels: &Array2<u8>, provenance: &Array2<bool>) -> Vec<u8> {
    let len = labels.len();
    let mut buffer = Vec::with_capacity(2 * len + 2);
    buffer.push(WIRE_MAGIC);
    buffer.extend(labels.iter().copied());
    buffer.extend(provenance.iter().map(|&human| human as u8));
    buffer.push(WIRE_MAGIC);
    buffer
}

/// Decode a wire payload into `(label grid, provenance grid)` of the given
/// mask shape. Exact inverse of [`encode_wire`].
///
/// Rejects payloads with the wrong total length, a bad start or end magic
/// byte, label bytes outside `0..=253` and provenance bytes other than 0/1.
pub fn decode_wire(bytes: &[u8], height: usize, width: usize) -> Result<(Array2<u8>, Array2<bool>)> {
    let len = height * width;
    let expected = 2 * len + 2;
    if bytes.len() != expected {
        return Err(CodecError::LengthMismatch {
            expected,
            got: bytes.len(),
        });
    }

    let (start, end) = (bytes[0], bytes[expected - 1]);
    if start != WIRE_MAGIC || end != WIRE_MAGIC {
        return Err(CodecError::BadMagic { start, end });
    }

    let label_bytes = &bytes[1..=len];
    if let Some(&bad) = label_bytes.iter().find(|&&value| value >= WIRE_MAGIC) {
        return Err(CodecError::LabelOutOfRange(bad));
    }

    let provenance_bytes = &bytes[len + 1..=2 * len];
    if let Some(&bad) = provenance_bytes.iter().find(|&&value| value > 1) {
        return Err(CodecError::BadProvenance(bad));
    }

    let labels = Array2::from_shape_vec((height, width), label_bytes.to_vec())
        .expect("slice length equals height * width");
    let provenance = Array2::from_shape_vec(
        (height, width),
        provenance_bytes.iter().map(|&value| value == 1).collect(),
    )
    .expect("slice length equals height * width");

    Ok((labels, provenance))
}
