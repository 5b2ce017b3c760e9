use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Highest class id representable on the wire; 254 is the magic marker byte.
pub const MAX_CLASS_ID: u8 = 253;

/// One annotation class: id, display name and RGBA colour.
///
/// The ordered set of class definitions for a project is fixed
/// configuration; the core never mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDef {
    pub id: u8,
    pub name: String,
    /// RGBA colour used for the `rgb`/`rgba` storage encodings
    pub colour: [u8; 4],
}

impl ClassDef {
    pub fn new(id: u8, name: impl Into<String>, colour: [u8; 4]) -> Self {
        Self {
            id,
            name: name.into(),
            colour,
        }
    }

    /// CSS colour string for the web layer
    pub fn css_colour(&self) -> String {
        format!(
            "rgba({}, {}, {}, {})",
            self.colour[0], self.colour[1], self.colour[2], self.colour[3]
        )
    }
}

/// Validate an ordered class table: non-empty, dense ids `0..n`, all ids
/// below the wire magic byte.
pub fn validate_classes(classes: &[ClassDef]) -> Result<()> {
    if classes.is_empty() {
        return Err(ConfigError::NoClasses);
    }
    for (position, class) in classes.iter().enumerate() {
        if class.id as usize != position {
            return Err(ConfigError::SparseClassIds {
                expected: classes.len(),
                got: class.id,
            });
        }
        if class.id > MAX_CLASS_ID {
            return Err(ConfigError::ClassIdReserved(class.id));
        }
    }
    Ok(())
}
