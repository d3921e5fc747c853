//! Partial ISO base media (MP4) parse for the duration probe. Walks top-level boxes to `moov`,
//! then moov's children to `mvhd`, and reads timescale and duration. Only the captured prefix
//! is examined: files whose moov sits at the end yield `NotFound`.
//!
//! Box header: 4-byte big-endian size (including the header), 4-byte ASCII type; size == 1
//! means a 64-bit size follows the type.

use crate::error::ContainerError;

const BOX_HEADER_LEN: usize = 8;
const LARGE_BOX_HEADER_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BoxHeader {
    /// Total box length including the header.
    size: usize,
    header_len: usize,
    kind: [u8; 4],
}

/// Duration in seconds of the movie described by the first `moov/mvhd` in `data`.
pub fn probe_duration(data: &[u8]) -> Result<f64, ContainerError> {
    let mvhd = find_mvhd(data)?;
    parse_duration(data, mvhd)
}

/// Offset of the `mvhd` box inside the first `moov` box.
pub fn find_mvhd(data: &[u8]) -> Result<usize, ContainerError> {
    let moov = find_box(data, 0, data.len(), b"moov")?.ok_or(ContainerError::NotFound(data.len()))?;
    let header = read_header(data, moov).ok_or(ContainerError::Truncated(moov))?;
    let body_end = moov.saturating_add(header.size).min(data.len());
    find_box(data, moov + header.header_len, body_end, b"mvhd")?.ok_or(ContainerError::NotFound(data.len()))
}

/// Read timescale and duration from the `mvhd` box at `at` (version 0 or 1).
pub fn parse_duration(data: &[u8], at: usize) -> Result<f64, ContainerError> {
    let header = read_header(data, at).ok_or(ContainerError::Truncated(at))?;
    let body = at + header.header_len;
    let version = *data.get(body).ok_or(ContainerError::Truncated(at))?;
    // version 0: 4-byte creation/modification times; version 1: 8-byte times and duration
    let (timescale, duration) = if version == 1 {
        (be_u32(data, body + 20, at)?, be_u64(data, body + 24, at)?)
    } else {
        (be_u32(data, body + 12, at)?, u64::from(be_u32(data, body + 16, at)?))
    };
    if timescale == 0 {
        return Err(ContainerError::InvalidTimescale);
    }
    Ok(duration as f64 / f64::from(timescale))
}

/// Scan sibling boxes in `[start, end)` for `kind`. The scan index must strictly increase on
/// every step; a box smaller than its own header aborts with `Truncated`.
fn find_box(data: &[u8], start: usize, end: usize, kind: &[u8; 4]) -> Result<Option<usize>, ContainerError> {
    let mut index = start;
    while index + BOX_HEADER_LEN <= end {
        let Some(header) = read_header(data, index) else {
            break;
        };
        if &header.kind == kind {
            return Ok(Some(index));
        }
        if header.size < header.header_len {
            return Err(ContainerError::Truncated(index));
        }
        let next = index.checked_add(header.size).ok_or(ContainerError::Truncated(index))?;
        if next <= index {
            return Err(ContainerError::Truncated(index));
        }
        index = next;
    }
    Ok(None)
}

fn read_header(data: &[u8], at: usize) -> Option<BoxHeader> {
    let head = data.get(at..at.checked_add(BOX_HEADER_LEN)?)?;
    let size = u32::from_be_bytes([head[0], head[1], head[2], head[3]]);
    let kind = [head[4], head[5], head[6], head[7]];
    if size == 1 {
        let large = data.get(at + BOX_HEADER_LEN..at + LARGE_BOX_HEADER_LEN)?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(large);
        return Some(BoxHeader {
            size: usize::try_from(u64::from_be_bytes(bytes)).unwrap_or(usize::MAX),
            header_len: LARGE_BOX_HEADER_LEN,
            kind,
        });
    }
    Some(BoxHeader {
        size: size as usize,
        header_len: BOX_HEADER_LEN,
        kind,
    })
}

fn be_u32(data: &[u8], offset: usize, box_at: usize) -> Result<u32, ContainerError> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(ContainerError::Truncated(box_at))
}

fn be_u64(data: &[u8], offset: usize, box_at: usize) -> Result<u64, ContainerError> {
    let b = data.get(offset..offset + 8).ok_or(ContainerError::Truncated(box_at))?;
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(b);
    Ok(u64::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mp4_box(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
        out.extend_from_slice(kind);
        out.extend_from_slice(payload);
        out
    }

    fn mvhd_v0(timescale: u32, duration: u32) -> Vec<u8> {
        let mut payload = vec![0u8; 100];
        payload[12..16].copy_from_slice(&timescale.to_be_bytes());
        payload[16..20].copy_from_slice(&duration.to_be_bytes());
        mp4_box(b"mvhd", &payload)
    }

    fn movie(timescale: u32, duration: u32) -> Vec<u8> {
        let mut data = mp4_box(b"ftyp", b"isomiso2");
        let mut moov_body = mp4_box(b"iods", &[0u8; 16]);
        moov_body.extend(mvhd_v0(timescale, duration));
        data.extend(mp4_box(b"moov", &moov_body));
        data.extend(mp4_box(b"mdat", &[0u8; 64]));
        data
    }

    #[test]
    fn reads_duration_from_mvhd() {
        assert_eq!(probe_duration(&movie(1000, 4000)).unwrap(), 4.0);
        assert_eq!(probe_duration(&movie(600, 900)).unwrap(), 1.5);
    }

    #[test]
    fn zero_timescale_is_invalid() {
        assert_eq!(probe_duration(&movie(0, 4000)), Err(ContainerError::InvalidTimescale));
    }

    #[test]
    fn missing_moov_is_not_found() {
        let mut data = mp4_box(b"ftyp", b"isomiso2");
        data.extend(mp4_box(b"mdat", &[0u8; 64]));
        assert_eq!(probe_duration(&data), Err(ContainerError::NotFound(data.len())));
    }

    #[test]
    fn moov_beyond_prefix_is_not_found() {
        let mut data = mp4_box(b"ftyp", b"isomiso2");
        // mdat claims more bytes than were captured
        data.extend_from_slice(&1_000_000u32.to_be_bytes());
        data.extend_from_slice(b"mdat");
        data.extend_from_slice(&[0u8; 32]);
        assert!(matches!(probe_duration(&data), Err(ContainerError::NotFound(_))));
    }

    #[test]
    fn zero_size_inner_box_is_truncated() {
        let mut moov_body = vec![0, 0, 0, 0];
        moov_body.extend_from_slice(b"free");
        moov_body.extend(mvhd_v0(1000, 4000));
        let data = mp4_box(b"moov", &moov_body);
        assert_eq!(probe_duration(&data), Err(ContainerError::Truncated(8)));
    }

    #[test]
    fn zero_size_top_level_box_is_truncated() {
        let mut data = vec![0, 0, 0, 0];
        data.extend_from_slice(b"free");
        data.extend(mp4_box(b"moov", &mvhd_v0(1000, 4000)));
        assert_eq!(probe_duration(&data), Err(ContainerError::Truncated(0)));
    }

    #[test]
    fn version_one_mvhd_and_large_size_box() {
        let mut payload = vec![0u8; 112];
        payload[0] = 1;
        payload[20..24].copy_from_slice(&90_000u32.to_be_bytes());
        payload[24..32].copy_from_slice(&450_000u64.to_be_bytes());
        let mvhd = mp4_box(b"mvhd", &payload);

        let mut data = 1u32.to_be_bytes().to_vec();
        data.extend_from_slice(b"free");
        data.extend_from_slice(&24u64.to_be_bytes());
        data.extend_from_slice(&[0u8; 8]);
        data.extend(mp4_box(b"moov", &mvhd));
        assert_eq!(probe_duration(&data).unwrap(), 5.0);
    }

    #[test]
    fn short_mvhd_is_truncated() {
        let data = mp4_box(b"moov", &mp4_box(b"mvhd", &[0u8; 10]));
        assert_eq!(probe_duration(&data), Err(ContainerError::Truncated(8)));
    }
}
