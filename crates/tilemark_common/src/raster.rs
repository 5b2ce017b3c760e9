use std::path::PathBuf;

use image::DynamicImage;
use ndarray::{Array3, s};
use tracing::debug;

use crate::{ConfigError, MaskArea, Result};

/// A multi-band raster for one image tile: H x W x C samples plus band
/// names. Band count is fixed per image and known before feature
/// extraction.
#[derive(Debug, Clone)]
pub struct Raster {
    pub samples: Array3<f32>,
    pub band_names: Vec<String>,
}

impl Raster {
    /// Wrap an H x W x C array; band names default to `B1..Bn`.
    pub fn from_array(samples: Array3<f32>) -> Result<Self> {
        let bands = samples.shape()[2];
        if bands == 0 {
            return Err(ConfigError::EmptyRaster);
        }
        let band_names = (1..=bands).map(|b| format!("B{b}")).collect();
        Ok(Self {
            samples,
            band_names,
        })
    }

    /// Decode a [`DynamicImage`] into a raster.
    ///
    /// Greyscale decodes to one band, RGB to three, anything else to four
    /// (RGBA); samples are normalised to `0.0..=1.0`.
    pub fn from_image(image: &DynamicImage) -> Result<Self> {
        let (width, height) = (image.width() as usize, image.height() as usize);
        let samples = match image.color().channel_count() {
            1 => {
                let buffer = image.to_luma32f();
                Array3::from_shape_vec((height, width, 1), buffer.into_raw())
            }
            3 => {
                let buffer = image.to_rgb32f();
                Array3::from_shape_vec((height, width, 3), buffer.into_raw())
            }
            _ => {
                let buffer = image.to_rgba32f();
                Array3::from_shape_vec((height, width, 4), buffer.into_raw())
            }
        }
        .expect("image buffer length matches its dimensions");

        Self::from_array(samples)
    }

    pub fn height(&self) -> usize {
        self.samples.shape()[0]
    }

    pub fn width(&self) -> usize {
        self.samples.shape()[1]
    }

    pub fn bands(&self) -> usize {
        self.samples.shape()[2]
    }

    /// Extract the masking-area window as an owned raster
    pub fn crop(&self, area: &MaskArea) -> Result<Self> {
        area.validate_within(self.height(), self.width())?;
        let window = self
            .samples
            .slice(s![area.row0..area.row1, area.col0..area.col1, ..])
            .to_owned();
        Ok(Self {
            samples: window,
            band_names: self.band_names.clone(),
        })
    }
}

/// Source of rasters addressed by image id.
///
/// The image storage collaborator owns the actual files; the core only
/// requires "decodes to H x W x C". Loaded fresh per request, no caching
/// guarantee.
pub trait RasterSource: Send + Sync {
    fn load(&self, image_id: &str) -> Result<Raster>;
    fn band_names(&self) -> &[String];
}

/// Raster source decoding common image formats from a directory, one file
/// per image id.
pub struct ImageDirSource {
    root: PathBuf,
    extension: String,
    band_names: Vec<String>,
}

impl ImageDirSource {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>, bands: usize) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
            band_names: (1..=bands).map(|b| format!("B{b}")).collect(),
        }
    }

    fn path_for(&self, image_id: &str) -> PathBuf {
        self.root.join(format!("{image_id}.{}", self.extension))
    }
}

impl RasterSource for ImageDirSource {
    fn load(&self, image_id: &str) -> Result<Raster> {
        let path = self.path_for(image_id);
        debug!(image_id, path = %path.display(), "loading raster");
        let image = image::open(&path)?;
        Raster::from_image(&image)
    }

    fn band_names(&self) -> &[String] {
        &self.band_names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_from_array_band_names() {
        let raster = Raster::from_array(Array3::zeros((4, 4, 3))).unwrap();
        assert_eq!(raster.band_names, vec!["B1", "B2", "B3"]);
        assert_eq!(raster.bands(), 3);
    }

    #[test]
    fn test_zero_bands_rejected() {
        assert!(Raster::from_array(Array3::zeros((4, 4, 0))).is_err());
    }

    #[test]
    fn test_crop_window() {
        let mut samples = Array3::zeros((8, 8, 1));
        samples[[3, 4, 0]] = 7.0;
        let raster = Raster::from_array(samples).unwrap();

        let area = MaskArea::new(2, 2, 6, 6).unwrap();
        let cropped = raster.crop(&area).unwrap();
        assert_eq!(cropped.height(), 4);
        assert_eq!(cropped.width(), 4);
        assert_eq!(cropped.samples[[1, 2, 0]], 7.0);
    }

    #[test]
    fn test_crop_out_of_bounds() {
        let raster = Raster::from_array(Array3::zeros((8, 8, 1))).unwrap();
        let area = MaskArea::new(2, 2, 9, 6).unwrap();
        assert!(raster.crop(&area).is_err());
    }
}
