//! QR heuristic scanner. Decoding is delegated to a [`QrDecoder`] capability; video frames come
//! from a [`FrameExtractor`]. Partial recognitions count as positives: a false positive costs one
//! withdrawn message, a miss lets an ad through.

pub mod decoder;
pub mod frames;
pub mod scanner;

pub use decoder::{DecodePass, PartialKind, QrDecode, QrDecoder, RqrrDecoder};
pub use frames::{list_frames, FfmpegExtractor, FrameExtractor};
pub use scanner::{CropWindow, QrScanner, CROP_PRESETS};

#[cfg(test)]
pub(crate) mod fixtures;
