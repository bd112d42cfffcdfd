use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result, bail, ensure};
use image::{ColorType, ImageEncoder, ImageFormat, codecs::png::PngEncoder};

use crate::surface::{Surface, rgb_to_rgb555};

const RAW_HEADER_LEN: usize = 4;

/// Decode a `.RAW` resource: `u16 width`, `u16 height`, then RGB555 pixels.
pub fn decode_raw(bytes: &[u8]) -> Result<Surface> {
    ensure!(
        bytes.len() >= RAW_HEADER_LEN,
        "RAW bitmap shorter than its header"
    );
    let width = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
    let height = u16::from_le_bytes([bytes[2], bytes[3]]) as usize;
    let expected = width * height * 2;
    let body = &bytes[RAW_HEADER_LEN..];
    ensure!(
        body.len() >= expected,
        "RAW bitmap {width}x{height} needs {expected} bytes, found {}",
        body.len()
    );

    let pixels = body[..expected]
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    Surface::from_pixels(width, height, pixels)
}

pub fn encode_raw(surface: &Surface) -> Vec<u8> {
    let mut out = Vec::with_capacity(RAW_HEADER_LEN + surface.pixels().len() * 2);
    out.extend_from_slice(&(surface.width() as u16).to_le_bytes());
    out.extend_from_slice(&(surface.height() as u16).to_le_bytes());
    for pixel in surface.pixels() {
        out.extend_from_slice(&pixel.to_le_bytes());
    }
    out
}

/// Decode a Windows bitmap into an RGB555 surface.
pub fn decode_bmp(bytes: &[u8]) -> Result<Surface> {
    let image = image::load_from_memory_with_format(bytes, ImageFormat::Bmp)
        .context("decoding BMP resource")?
        .to_rgba8();
    let (width, height) = image.dimensions();
    let pixels = image
        .pixels()
        .map(|pixel| rgb_to_rgb555(pixel[0], pixel[1], pixel[2]))
        .collect();
    Surface::from_pixels(width as usize, height as usize, pixels)
}

/// Decode a still bitmap resource, dispatching on the file extension.
pub fn decode_bitmap(name: &str, bytes: &[u8]) -> Result<Surface> {
    let extension = Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_uppercase());
    match extension.as_deref() {
        Some("RAW") => decode_raw(bytes).with_context(|| format!("decoding {name}")),
        Some("BMP") => decode_bmp(bytes).with_context(|| format!("decoding {name}")),
        _ => bail!("{name} is not a supported bitmap resource"),
    }
}

/// Write a surface to disk as an RGBA PNG.
pub fn write_png<P: AsRef<Path>>(surface: &Surface, path: P) -> Result<()> {
    let path = path.as_ref();
    let file =
        File::create(path).with_context(|| format!("creating PNG {}", path.display()))?;
    let encoder = PngEncoder::new(BufWriter::new(file));
    encoder
        .write_image(
            &surface.to_rgba(),
            surface.width() as u32,
            surface.height() as u32,
            ColorType::Rgba8,
        )
        .with_context(|| format!("encoding PNG {}", path.display()))
}
