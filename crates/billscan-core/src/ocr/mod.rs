//! Text extraction through an external OCR service.

mod vision;

pub use vision::VisionClient;

use image::DynamicImage;

use crate::error::Result;

/// Turns an invoice image into raw text.
#[allow(async_fn_in_trait)]
pub trait TextExtractor {
    /// Extract the full text of the image. An image without text yields an
    /// empty string, not an error.
    async fn extract_text(&self, image: &DynamicImage) -> Result<String>;
}

/// Shrink an image so its longer side is at most `max_size` pixels.
pub fn fit_image(image: &DynamicImage, max_size: u32) -> Option<DynamicImage> {
    if max_size == 0 || (image.width() <= max_size && image.height() <= max_size) {
        return None;
    }
    Some(image.resize(max_size, max_size, image::imageops::FilterType::Triangle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_image_keeps_small_images() {
        let image = DynamicImage::new_rgb8(100, 50);
        assert!(fit_image(&image, 2048).is_none());
        assert!(fit_image(&image, 0).is_none());
    }

    #[test]
    fn test_fit_image_preserves_aspect() {
        let image = DynamicImage::new_rgb8(4000, 2000);
        let fitted = fit_image(&image, 1000).unwrap();
        assert_eq!((fitted.width(), fitted.height()), (1000, 500));
    }
}
