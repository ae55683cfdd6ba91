// ============================================================================
// IMAGE I/O: decode into surfaces, encode composites as PNG
// ============================================================================

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};

use crate::error::{EditError, EditResult};
use crate::surface::PixelSurface;

/// Encode a surface as an RGBA8 PNG in memory.
pub fn encode_png(surface: &PixelSurface) -> EditResult<Vec<u8>> {
    let mut buf = Vec::new();
    write_png_to(&mut buf, surface)?;
    Ok(buf)
}

fn write_png_to<W: std::io::Write>(writer: W, surface: &PixelSurface) -> EditResult<()> {
    PngEncoder::new(writer)
        .write_image(surface.pixels(), surface.width(), surface.height(), ColorType::Rgba8)
        .map_err(EditError::Encode)
}

/// Decode any format the `image` crate understands into an RGBA surface.
pub fn decode_image(bytes: &[u8]) -> EditResult<PixelSurface> {
    let img = image::load_from_memory(bytes).map_err(EditError::Decode)?.to_rgba8();
    PixelSurface::from_rgba_image(img)
}

/// Load an image file. Returns the surface and a layer name taken from the
/// file stem.
pub fn load_image_file(path: &Path) -> EditResult<(PixelSurface, String)> {
    let img = image::open(path).map_err(EditError::Decode)?.to_rgba8();
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Image")
        .to_string();
    tracing::info!(path = %path.display(), w = img.width(), h = img.height(), "Loaded image");
    Ok((PixelSurface::from_rgba_image(img)?, name))
}

/// Write a surface to `path` as PNG.
pub fn write_png(path: &Path, surface: &PixelSurface) -> EditResult<()> {
    let file = File::create(path)?;
    write_png_to(BufWriter::new(file), surface)?;
    tracing::info!(path = %path.display(), "Wrote PNG");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn png_survives_encode_and_decode() {
        let mut surface = PixelSurface::new(3, 2).unwrap();
        surface.put_pixel(2, 1, Rgba([10, 20, 30, 40]));
        let bytes = encode_png(&surface).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
        assert_eq!(decode_image(&bytes).unwrap(), surface);
    }

    #[test]
    fn garbage_fails_to_decode() {
        assert!(matches!(decode_image(b"not an image"), Err(EditError::Decode(_))));
    }
}
