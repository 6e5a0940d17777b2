use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use rqrr::PreparedImage;
use serde::{Deserialize, Serialize};

/// Outcome of a QR probe. Only `present` feeds matching; the payload is
/// kept for reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrResult {
    pub present: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    /// Long-edge target the image was scaled to before decoding; 0 if unknown
    #[serde(default)]
    pub resize: u32,
}

impl QrResult {
    pub fn absent() -> Self {
        Self {
            present: false,
            payload: None,
            resize: 0,
        }
    }

    pub fn found(payload: String) -> Self {
        Self {
            present: true,
            payload: Some(payload),
            resize: 0,
        }
    }

    pub fn at_resize(mut self, resize: u32) -> Self {
        self.resize = resize;
        self
    }
}

/// Finds QR symbols in decoded images
pub trait QrDetector: Send + Sync {
    /// Payload of the first decodable symbol, after scaling the long edge
    /// down to `resize_target`
    fn decode(&self, img: &DynamicImage, resize_target: u32) -> Option<String>;

    /// Whether any decodable symbol is present
    fn detect(&self, img: &DynamicImage, resize_target: u32) -> bool {
        self.decode(img, resize_target).is_some()
    }

    fn probe(&self, img: &DynamicImage, resize_target: u32) -> QrResult {
        let result = match self.decode(img, resize_target) {
            Some(payload) => QrResult::found(payload),
            None => QrResult::absent(),
        };
        result.at_resize(resize_target)
    }
}

/// Pure-Rust decoder backed by `rqrr`
#[derive(Debug, Clone, Copy, Default)]
pub struct RqrrDetector;

/// Grayscale copy with the long edge at most `target` pixels
pub fn prepare_luma(img: &DynamicImage, target: u32) -> GrayImage {
    let long_edge = img.width().max(img.height());
    if target > 0 && long_edge > target {
        img.resize(target, target, FilterType::Triangle).to_luma8()
    } else {
        img.to_luma8()
    }
}

impl QrDetector for RqrrDetector {
    fn decode(&self, img: &DynamicImage, resize_target: u32) -> Option<String> {
        let luma = prepare_luma(img, resize_target);
        let (width, height) = luma.dimensions();
        if width == 0 || height == 0 {
            return None;
        }

        let mut prepared = PreparedImage::prepare_from_greyscale(width as usize, height as usize, |x, y| {
            luma.get_pixel(x as u32, y as u32)[0]
        });
        for grid in prepared.detect_grids() {
            match grid.decode() {
                Ok((_, content)) => return Some(content),
                Err(e) => tracing::trace!("QR grid found but not decodable: {:?}", e),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_page_has_no_qr() {
        let img = DynamicImage::new_rgb8(320, 480);
        assert!(!RqrrDetector.detect(&img, 800));
        assert_eq!(RqrrDetector.probe(&img, 800), QrResult::absent());
    }

    #[test]
    fn test_long_edge_is_scaled_to_target() {
        let img = DynamicImage::new_rgb8(1200, 2400);
        let luma = prepare_luma(&img, 600);
        assert_eq!(luma.height(), 600);
        assert_eq!(luma.width(), 300);

        let small = DynamicImage::new_rgb8(200, 100);
        assert_eq!(prepare_luma(&small, 600).dimensions(), (200, 100));
    }
}
