use image::{DynamicImage, RgbImage};
use std::io::Cursor;

/// A `size × size` solid black RGB JPEG, written in place of an image that
/// could not be downloaded.
pub fn placeholder_jpeg(size: u32) -> Result<Vec<u8>, image::ImageError> {
    let img = RgbImage::new(size, size);
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img).write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Jpeg)?;
    Ok(buf)
}
