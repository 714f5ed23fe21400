//! Pairing QR rendering: terminal, SVG and PNG

use crate::error::{Error, Result};
use image::{ImageBuffer, Luma};
use qrcode::render::svg;
use qrcode::{Color, EcLevel, QrCode};
use std::io::Cursor;

const MODULE_PX: u32 = 10;
const QUIET_MODULES: u32 = 2;

/// Fallback image service for terminals that can't show block characters
pub const QR_SERVICE_URL: &str = "https://api.qrserver.com/v1/create-qr-code/?size=400x400&data=";

fn encode(token: &str) -> Result<QrCode> {
    QrCode::with_error_correction_level(token.as_bytes(), EcLevel::L)
        .map_err(|e| Error::Qr(format!("QR generation failed: {}", e)))
}

/// Two module rows per text line using half blocks
pub fn render_terminal(token: &str) -> Result<String> {
    let code = encode(token)?;
    let width = code.width();
    let colors = code.into_colors();
    let dark = |row: usize, col: usize| row < width && colors[row * width + col] == Color::Dark;

    let mut out = String::new();
    for row in (0..width).step_by(2) {
        for col in 0..width {
            out.push(match (dark(row, col), dark(row + 1, col)) {
                (true, true) => '█',
                (true, false) => '▀',
                (false, true) => '▄',
                (false, false) => ' ',
            });
        }
        out.push('\n');
    }
    Ok(out)
}

pub fn render_svg(token: &str) -> Result<String> {
    let code = encode(token)?;
    Ok(code
        .render::<svg::Color>()
        .min_dimensions(256, 256)
        .quiet_zone(true)
        .build())
}

/// PNG bytes with a white quiet zone
pub fn render_png(token: &str) -> Result<Vec<u8>> {
    let code = encode(token)?;
    let modules = code.width() as u32;
    let size = (modules + QUIET_MODULES * 2) * MODULE_PX;

    let img = ImageBuffer::from_fn(size, size, |x, y| {
        let (cx, cy) = (x / MODULE_PX, y / MODULE_PX);
        if cx < QUIET_MODULES || cy < QUIET_MODULES {
            return Luma([255u8]);
        }
        let (mx, my) = (cx - QUIET_MODULES, cy - QUIET_MODULES);
        if mx >= modules || my >= modules {
            return Luma([255u8]);
        }
        match code[(mx as usize, my as usize)] {
            Color::Dark => Luma([0u8]),
            Color::Light => Luma([255u8]),
        }
    });

    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)
        .map_err(|e| Error::Image(format!("PNG encoding failed: {}", e)))?;
    Ok(buf.into_inner())
}

/// Link to an externally rendered copy of the QR
pub fn qrserver_url(token: &str) -> String {
    format!("{}{}", QR_SERVICE_URL, percent_encode(token))
}

/// RFC 3986 unreserved characters pass through; everything else is %XX
fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len() * 3);
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
