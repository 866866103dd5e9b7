use image::{imageops::FilterType, ImageError};

use crate::model::{ImageBatch, IMAGE_DIMENSIONS};

/// Decodes an uploaded image into the classifier's input batch.
///
/// The image is stretched to the model frame regardless of its aspect ratio
/// and channel values are scaled from `0..=255` to `0.0..=1.0`.
pub fn preprocess_image(image_data: &[u8]) -> Result<ImageBatch, ImageError> {
    let (width, height, channels) = IMAGE_DIMENSIONS;

    let img = image::load_from_memory(image_data)?.to_rgb8();
    let resized = image::imageops::resize(&img, width, height, FilterType::CatmullRom);

    let data = resized
        .into_raw()
        .into_iter()
        .map(|value| value as f32 / 255.0)
        .collect();

    Ok(ImageBatch {
        data,
        height,
        width,
        channels,
    })
}
