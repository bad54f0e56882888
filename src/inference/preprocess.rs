//! Image preprocessing
//!
//! Decodes an uploaded file and turns it into the `[1, 224, 224, 3]` NHWC
//! tensor the CNN was trained on. The aspect ratio is not preserved; the
//! network was trained on stretched inputs as well.

use std::path::Path;

use image::{imageops::FilterType, DynamicImage, ImageReader, RgbImage};
use ndarray::Array4;

use super::error::PipelineError;

/// Model input edge length
pub const INPUT_SIZE: u32 = 224;

/// Color channels after RGB conversion
pub const CHANNELS: usize = 3;

/// Output of preprocessing
#[derive(Debug)]
pub struct Preprocessed {
    /// `[1, H, W, 3]`, values in `[0, 1]`
    pub tensor: Array4<f32>,
    /// The resized RGB image the tensor was built from
    pub image: RgbImage,
}

/// Decode the image at `path` and build the model input.
///
/// The format is sniffed from the file content so uploads with a missing or
/// wrong extension still decode.
pub fn preprocess_image(path: &Path) -> Result<Preprocessed, PipelineError> {
    let decode_err = |message: String| PipelineError::ImageDecode {
        path: path.to_path_buf(),
        message,
    };

    let image = ImageReader::open(path)
        .map_err(|e| decode_err(e.to_string()))?
        .with_guessed_format()
        .map_err(|e| decode_err(e.to_string()))?
        .decode()
        .map_err(|e| decode_err(e.to_string()))?;

    tracing::debug!(
        "Decoded {} ({}x{}, {:?})",
        path.display(),
        image.width(),
        image.height(),
        image.color()
    );

    Ok(preprocess_dynamic(&image))
}

/// Build the model input from an already decoded image.
pub fn preprocess_dynamic(image: &DynamicImage) -> Preprocessed {
    // Drops alpha, expands grayscale
    let rgb = image.to_rgb8();
    let resized = image::imageops::resize(&rgb, INPUT_SIZE, INPUT_SIZE, FilterType::CatmullRom);
    let tensor = to_nhwc_tensor(&resized);

    Preprocessed {
        tensor,
        image: resized,
    }
}

/// Scale 8-bit RGB pixels into a `[1, H, W, 3]` tensor in `[0, 1]`.
fn to_nhwc_tensor(image: &RgbImage) -> Array4<f32> {
    let (width, height) = image.dimensions();
    Array4::from_shape_fn(
        (1, height as usize, width as usize, CHANNELS),
        |(_, y, x, c)| f32::from(image.get_pixel(x as u32, y as u32)[c]) / 255.0,
    )
}
