//! Test images.

use image::{DynamicImage, GrayImage};

/// Renders `payload` with a 4-module quiet zone at `scale` px per module.
pub(crate) fn qr_fixture(payload: &str, scale: u32) -> GrayImage {
    let code = qrcode::QrCode::new(payload.as_bytes()).unwrap();
    let modules = code.width() as u32;
    let colors = code.to_colors();
    let quiet = 4;
    let side = (modules + 2 * quiet) * scale;
    GrayImage::from_fn(side, side, |x, y| {
        let (mx, my) = (x / scale, y / scale);
        if mx < quiet || my < quiet || mx >= modules + quiet || my >= modules + quiet {
            return image::Luma([255]);
        }
        let idx = ((my - quiet) * modules + (mx - quiet)) as usize;
        match colors[idx] {
            qrcode::Color::Dark => image::Luma([0]),
            qrcode::Color::Light => image::Luma([255]),
        }
    })
}

pub(crate) fn png_bytes(img: &GrayImage) -> Vec<u8> {
    encoded_bytes(img, image::ImageFormat::Png)
}

/// Encodes through RGBA so every enabled format accepts the buffer.
pub(crate) fn encoded_bytes(img: &GrayImage, format: image::ImageFormat) -> Vec<u8> {
    let mut buf = std::io::Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(DynamicImage::ImageLuma8(img.clone()).to_rgba8())
        .write_to(&mut buf, format)
        .unwrap();
    buf.into_inner()
}

/// 1x1 transparent GIF89a, the usual tracking-pixel bytes.
pub(crate) const PIXEL_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0xff, 0xff, 0xff,
    0x00, 0x00, 0x00, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00, 0x00, 0x00,
    0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];
