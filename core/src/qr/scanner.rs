//! Crop-and-decode loop over one image, plus the per-video frame count.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{DynamicImage, GrayImage};

use super::decoder::{DecodePass, QrDecoder, RqrrDecoder};
use crate::error::DecodeError;

/// Fraction of the height trimmed from the top and bottom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropWindow {
    pub top: f32,
    pub bottom: f32,
}

const fn window(top: f32, bottom: f32) -> CropWindow {
    CropWindow { top, bottom }
}

/// Full frame first, then progressively tighter trims; the last is the centre half strip.
pub const CROP_PRESETS: [CropWindow; 12] = [
    window(0.0, 0.0),
    window(0.2, 0.0),
    window(0.3, 0.0),
    window(0.4, 0.0),
    window(0.0, 0.2),
    window(0.0, 0.3),
    window(0.0, 0.4),
    window(0.1, 0.1),
    window(0.2, 0.2),
    window(0.3, 0.3),
    window(0.4, 0.4),
    window(0.25, 0.25),
];

impl CropWindow {
    /// Cropped copy, or None when the window leaves no rows.
    pub fn apply(&self, gray: &GrayImage) -> Option<GrayImage> {
        let (w, h) = gray.dimensions();
        let top = (h as f32 * self.top) as u32;
        let bottom = (h as f32 * self.bottom) as u32;
        let rows = h.checked_sub(top)?.checked_sub(bottom)?;
        if w == 0 || rows == 0 {
            return None;
        }
        Some(image::imageops::crop_imm(gray, 0, top, w, rows).to_image())
    }
}

#[derive(Clone)]
pub struct QrScanner {
    decoder: Arc<dyn QrDecoder>,
}

impl Default for QrScanner {
    fn default() -> Self {
        Self::new(Arc::new(RqrrDecoder))
    }
}

impl QrScanner {
    pub fn new(decoder: Arc<dyn QrDecoder>) -> Self {
        Self { decoder }
    }

    /// True on the first crop where either pass reports a positive.
    pub fn scan_gray(&self, gray: &GrayImage) -> bool {
        for (index, crop) in CROP_PRESETS.iter().enumerate() {
            let Some(cropped) = crop.apply(gray) else {
                continue;
            };
            for pass in DecodePass::ALL {
                let result = self.decoder.decode(&cropped, pass);
                if pass.accepts(&result) {
                    tracing::debug!(crop = index, ?pass, ?result, "qr positive");
                    return true;
                }
            }
        }
        false
    }

    pub fn scan_image(&self, image: &DynamicImage) -> bool {
        self.scan_gray(&image.to_luma8())
    }

    pub fn scan_bytes(&self, bytes: &[u8]) -> Result<bool, DecodeError> {
        let image = image::load_from_memory(bytes)?;
        Ok(self.scan_image(&image))
    }

    pub fn scan_file(&self, path: &Path) -> Result<bool, DecodeError> {
        let image = image::open(path)?;
        Ok(self.scan_image(&image))
    }

    /// Scan frames in order until `threshold` positives are seen. Unreadable frames count as
    /// negatives.
    pub fn scan_frames(&self, frames: &[PathBuf], threshold: usize) -> bool {
        let threshold = threshold.max(1);
        let mut positives = 0usize;
        for frame in frames {
            match self.scan_file(frame) {
                Ok(true) => {
                    positives += 1;
                    tracing::debug!(frame = %frame.display(), positives, threshold, "qr frame positive");
                    if positives >= threshold {
                        return true;
                    }
                }
                Ok(false) => {}
                Err(e) => tracing::warn!(frame = %frame.display(), error = %e, "skip unreadable frame"),
            }
        }
        false
    }
}
