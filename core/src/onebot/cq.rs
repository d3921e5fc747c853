//! CQ media markers embedded in `raw_message`: `[CQ:video,file=...,url=...]` and
//! `[CQ:image,file=...,url=...]`. Parameters are comma separated; commas, brackets and
//! ampersands inside values arrive escaped.

use std::sync::LazyLock;

use regex::Regex;

static MEDIA_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[CQ:(video|image),([^\]]*)\]").expect("media marker regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Image,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaReference {
    pub kind: MediaKind,
    pub url: String,
}

/// All media markers carrying a `url=` parameter, in message order.
pub fn extract_media(raw: &str) -> Vec<MediaReference> {
    MEDIA_MARKER
        .captures_iter(raw)
        .filter_map(|caps| {
            let kind = match &caps[1] {
                "video" => MediaKind::Video,
                _ => MediaKind::Image,
            };
            let url = caps[2]
                .split(',')
                .find_map(|param| param.strip_prefix("url="))
                .map(unescape)
                .filter(|url| !url.is_empty())?;
            Some(MediaReference { kind, url })
        })
        .collect()
}

/// First video marker, if any.
pub fn first_video(media: &[MediaReference]) -> Option<&MediaReference> {
    media.iter().find(|m| m.kind == MediaKind::Video)
}

/// Image markers in message order.
pub fn images(media: &[MediaReference]) -> impl Iterator<Item = &MediaReference> {
    media.iter().filter(|m| m.kind == MediaKind::Image)
}

fn unescape(value: &str) -> String {
    value
        .replace("\\u0026amp;", "&")
        .replace("&#44;", ",")
        .replace("&#91;", "[")
        .replace("&#93;", "]")
        .replace("&amp;", "&")
}
