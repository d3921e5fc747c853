//! Decode capability. Results are structured so the scanner never inspects error text.

use image::GrayImage;

/// Which of the two decode attempts is being made on a crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodePass {
    /// Luminance handed to the decoder as-is (it binarizes locally).
    PureBarcode,
    /// Image first binarized with a single histogram-derived threshold.
    GlobalHistogram,
}

impl DecodePass {
    pub const ALL: [DecodePass; 2] = [DecodePass::PureBarcode, DecodePass::GlobalHistogram];

    /// Whether `result` counts as a positive for this pass. The first pass trusts a located
    /// finder pattern; the second trusts format/checksum mismatches.
    pub fn accepts(&self, result: &QrDecode) -> bool {
        match (self, result) {
            (_, QrDecode::Decoded(_)) => true,
            (DecodePass::PureBarcode, QrDecode::PartialMatch(PartialKind::FinderPattern)) => true,
            (DecodePass::GlobalHistogram, QrDecode::PartialMatch(PartialKind::Format))
            | (DecodePass::GlobalHistogram, QrDecode::PartialMatch(PartialKind::Checksum)) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialKind {
    /// Finder patterns located, symbol could not be read.
    FinderPattern,
    /// Format/version information unreadable.
    Format,
    /// Error correction failed.
    Checksum,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QrDecode {
    NotFound,
    PartialMatch(PartialKind),
    Decoded(String),
}

pub trait QrDecoder: Send + Sync {
    fn decode(&self, image: &GrayImage, pass: DecodePass) -> QrDecode;
}

/// Default decoder backed by `rqrr`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RqrrDecoder;

impl QrDecoder for RqrrDecoder {
    fn decode(&self, image: &GrayImage, pass: DecodePass) -> QrDecode {
        match pass {
            DecodePass::PureBarcode => match detect(image) {
                Detection::None => QrDecode::NotFound,
                Detection::Decoded(text) => QrDecode::Decoded(text),
                Detection::Failed(_) => QrDecode::PartialMatch(PartialKind::FinderPattern),
            },
            DecodePass::GlobalHistogram => {
                let Some(threshold) = global_histogram_threshold(image) else {
                    return QrDecode::NotFound;
                };
                let binary = GrayImage::from_fn(image.width(), image.height(), |x, y| {
                    if image.get_pixel(x, y).0[0] < threshold {
                        image::Luma([0])
                    } else {
                        image::Luma([255])
                    }
                });
                match detect(&binary) {
                    Detection::None => QrDecode::NotFound,
                    Detection::Decoded(text) => QrDecode::Decoded(text),
                    Detection::Failed(rqrr::DeQRError::DataEcc) => {
                        QrDecode::PartialMatch(PartialKind::Checksum)
                    }
                    Detection::Failed(_) => QrDecode::PartialMatch(PartialKind::Format),
                }
            }
        }
    }
}

enum Detection {
    None,
    Decoded(String),
    /// Every located grid failed; carries the last failure.
    Failed(rqrr::DeQRError),
}

fn detect(image: &GrayImage) -> Detection {
    let (w, h) = (image.width() as usize, image.height() as usize);
    if w == 0 || h == 0 {
        return Detection::None;
    }
    let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(w, h, |x, y| {
        image.get_pixel(x as u32, y as u32).0[0]
    });
    let mut failure = None;
    for grid in prepared.detect_grids() {
        match grid.decode() {
            Ok((_meta, text)) => return Detection::Decoded(text),
            Err(e) => failure = Some(e),
        }
    }
    match failure {
        Some(e) => Detection::Failed(e),
        None => Detection::None,
    }
}

const LUMINANCE_BITS: u32 = 5;
const LUMINANCE_SHIFT: u32 = 8 - LUMINANCE_BITS;
const LUMINANCE_BUCKETS: usize = 1 << LUMINANCE_BITS;

/// Single black/white threshold from a 32-bucket histogram of four sample rows across the central
/// three fifths of the image: the deepest valley between the two dominant peaks. None when the
/// image is too small or has no second peak (e.g. a solid colour).
pub fn global_histogram_threshold(image: &GrayImage) -> Option<u8> {
    let (w, h) = (image.width(), image.height());
    if w < 5 || h < 5 {
        return None;
    }
    let mut buckets = [0u32; LUMINANCE_BUCKETS];
    for row in 1..5 {
        let y = h * row / 5;
        for x in (w / 5)..(w * 4 / 5) {
            let lum = image.get_pixel(x, y).0[0];
            buckets[(lum >> LUMINANCE_SHIFT) as usize] += 1;
        }
    }

    let mut first_peak = 0usize;
    let mut max_count = 0u32;
    for (i, &count) in buckets.iter().enumerate() {
        if count > max_count {
            first_peak = i;
            max_count = count;
        }
    }

    let mut second_peak = None;
    let mut second_score = 0u64;
    for (i, &count) in buckets.iter().enumerate() {
        let distance = i.abs_diff(first_peak) as u64;
        let score = count as u64 * distance * distance;
        if score > second_score {
            second_peak = Some(i);
            second_score = score;
        }
    }
    // Only empty buckets besides the first peak: nothing to separate.
    let second_peak = second_peak?;

    let (low, high) = if first_peak <= second_peak {
        (first_peak, second_peak)
    } else {
        (second_peak, first_peak)
    };
    if high - low <= LUMINANCE_BUCKETS / 16 {
        return None;
    }

    let mut best_valley = high - 1;
    let mut best_score: i64 = -1;
    for x in (low + 1..high).rev() {
        let from_low = (x - low) as i64;
        let score = from_low * from_low * (high - x) as i64 * (max_count - buckets[x]) as i64;
        if score > best_score {
            best_valley = x;
            best_score = score;
        }
    }
    Some((best_valley << LUMINANCE_SHIFT) as u8)
}
