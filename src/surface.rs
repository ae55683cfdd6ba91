// ============================================================================
// PIXEL SURFACE: owned contiguous RGBA8 buffer used by every layer
// ============================================================================

use egui::{Pos2, Rect};
use image::{imageops, Rgba, RgbaImage};

use crate::error::{EditError, EditResult};

/// Largest surface we agree to allocate (~256 megapixels).
pub const MAX_SURFACE_PIXELS: u64 = 256_000_000;

pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Sampling used when `draw_image` scales a source region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ResampleFilter {
    Nearest,
    #[default]
    Bilinear,
}

impl ResampleFilter {
    pub fn name(&self) -> &'static str {
        match self {
            ResampleFilter::Nearest => "nearest",
            ResampleFilter::Bilinear => "bilinear",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "nearest" => Some(ResampleFilter::Nearest),
            "bilinear" | "linear" => Some(ResampleFilter::Bilinear),
            _ => None,
        }
    }
}

/// Reject zero sides and anything over `MAX_SURFACE_PIXELS`.
pub fn check_dimensions(width: u32, height: u32) -> EditResult<()> {
    if width == 0 || height == 0 {
        return Err(EditError::InvalidGeometry {
            width: width as i64,
            height: height as i64,
        });
    }
    if (width as u64) * (height as u64) > MAX_SURFACE_PIXELS {
        return Err(EditError::AllocationFailure { width, height });
    }
    Ok(())
}

/// Zero-filled RGBA buffer. Uses `try_reserve_exact` so an impossible
/// allocation comes back as an error instead of aborting the process.
fn allocate(width: u32, height: u32) -> EditResult<RgbaImage> {
    check_dimensions(width, height)?;
    let len = width as usize * height as usize * 4;
    let mut buf: Vec<u8> = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| EditError::AllocationFailure { width, height })?;
    buf.resize(len, 0);
    RgbaImage::from_raw(width, height, buf).ok_or(EditError::AllocationFailure { width, height })
}

/// Straight-alpha source-over of `src` (scaled by `alpha`) onto `dst`.
#[inline]
pub fn source_over(dst: Rgba<u8>, src: Rgba<u8>, alpha: f32) -> Rgba<u8> {
    let sa = (src[3] as f32 / 255.0) * alpha.clamp(0.0, 1.0);
    if sa <= 0.0 {
        return dst;
    }
    if sa >= 1.0 {
        return Rgba([src[0], src[1], src[2], 255]);
    }
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        return TRANSPARENT;
    }
    let mut out = [0u8; 4];
    for c in 0..3 {
        let s = src[c] as f32 / 255.0;
        let d = dst[c] as f32 / 255.0;
        let v = (s * sa + d * da * (1.0 - sa)) / out_a;
        out[c] = (v * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba(out)
}

/// Destination-out: remove `alpha` worth of coverage from `dst`.
#[inline]
pub fn destination_out(dst: Rgba<u8>, alpha: f32) -> Rgba<u8> {
    let keep = 1.0 - alpha.clamp(0.0, 1.0);
    let a = (dst[3] as f32 * keep).round().clamp(0.0, 255.0) as u8;
    if a == 0 {
        TRANSPARENT
    } else {
        Rgba([dst[0], dst[1], dst[2], a])
    }
}

/// A width × height RGBA8 pixel buffer, row-major, straight alpha.
///
/// Owned by exactly one layer (or one history snapshot). Geometry changes
/// produce a new surface rather than mutating this one in place.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelSurface {
    image: RgbaImage,
}

impl PixelSurface {
    // ---- construction -------------------------------------------------------

    /// Allocate a fully transparent surface.
    pub fn new(width: u32, height: u32) -> EditResult<Self> {
        Ok(Self { image: allocate(width, height)? })
    }

    pub fn filled(width: u32, height: u32, color: Rgba<u8>) -> EditResult<Self> {
        let mut surface = Self::new(width, height)?;
        surface.fill(color);
        Ok(surface)
    }

    /// Wrap an existing image. Zero-sized images are rejected.
    pub fn from_rgba_image(image: RgbaImage) -> EditResult<Self> {
        check_dimensions(image.width(), image.height())?;
        Ok(Self { image })
    }

    /// Build from a flat row-major RGBA byte vector.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> EditResult<Self> {
        check_dimensions(width, height)?;
        let expected = width as usize * height as usize * 4;
        let actual = data.len();
        let image = RgbaImage::from_raw(width, height, data)
            .ok_or(EditError::BufferSize { expected, actual })?;
        Ok(Self { image })
    }

    // ---- geometry -----------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn bounds(&self) -> Rect {
        Rect::from_min_size(Pos2::ZERO, egui::vec2(self.width() as f32, self.height() as f32))
    }

    pub fn memory_bytes(&self) -> usize {
        self.image.as_raw().len()
    }

    // ---- pixel access -------------------------------------------------------

    /// Read a pixel; out-of-range coordinates read as transparent.
    #[inline]
    pub fn get_pixel(&self, x: u32, y: u32) -> Rgba<u8> {
        if x >= self.width() || y >= self.height() {
            return TRANSPARENT;
        }
        *self.image.get_pixel(x, y)
    }

    /// Signed-coordinate read, transparent outside the surface.
    #[inline]
    pub fn get_pixel_i(&self, x: i64, y: i64) -> Rgba<u8> {
        if x < 0 || y < 0 {
            return TRANSPARENT;
        }
        self.get_pixel(x as u32, y as u32)
    }

    /// Write a pixel; out-of-range writes are dropped.
    #[inline]
    pub fn put_pixel(&mut self, x: u32, y: u32, pixel: Rgba<u8>) {
        if x < self.width() && y < self.height() {
            self.image.put_pixel(x, y, pixel);
        }
    }

    #[inline]
    pub fn pixel_mut(&mut self, x: u32, y: u32) -> Option<&mut Rgba<u8>> {
        if x < self.width() && y < self.height() {
            Some(self.image.get_pixel_mut(x, y))
        } else {
            None
        }
    }

    /// Raw row-major RGBA bytes.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub(crate) fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.image
    }

    /// Overwrite every pixel from a flat RGBA buffer of matching length.
    pub fn put_pixels(&mut self, data: &[u8]) -> EditResult<()> {
        let expected = self.memory_bytes();
        if data.len() != expected {
            return Err(EditError::BufferSize { expected, actual: data.len() });
        }
        self.pixels_mut().copy_from_slice(data);
        Ok(())
    }

    pub fn as_rgba_image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_rgba_image(self) -> RgbaImage {
        self.image
    }

    // ---- bulk ops -----------------------------------------------------------

    pub fn fill(&mut self, color: Rgba<u8>) {
        for px in self.image.pixels_mut() {
            *px = color;
        }
    }

    pub fn clear(&mut self) {
        self.pixels_mut().fill(0);
    }

    /// Zero every pixel whose centre lies inside `rect`.
    pub fn clear_rect(&mut self, rect: Rect) {
        let Some((x0, y0, x1, y1)) = self.pixel_span(rect) else { return };
        let stride = self.width() as usize * 4;
        let buf = self.pixels_mut();
        for y in y0..y1 {
            let start = y as usize * stride + x0 as usize * 4;
            let end = y as usize * stride + x1 as usize * 4;
            buf[start..end].fill(0);
        }
    }

    /// Integer pixel range `[x0, x1) × [y0, y1)` whose centres fall inside
    /// `rect`, clipped to the surface. `None` when empty.
    pub fn pixel_span(&self, rect: Rect) -> Option<(u32, u32, u32, u32)> {
        if !(rect.width() > 0.0 && rect.height() > 0.0) {
            return None;
        }
        let x0 = (rect.min.x - 0.5).ceil().max(0.0);
        let y0 = (rect.min.y - 0.5).ceil().max(0.0);
        let x1 = (rect.max.x - 0.5).ceil().min(self.width() as f32);
        let y1 = (rect.max.y - 0.5).ceil().min(self.height() as f32);
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
    }

    /// Draw `src_rect` of `source` into `dst_rect` of this surface
    /// (source-over), resampling with `filter` when the sizes differ.
    /// Samples never read outside `src_rect`.
    pub fn draw_image(&mut self, source: &PixelSurface, src_rect: Rect, dst_rect: Rect, filter: ResampleFilter) {
        let src_rect = src_rect.intersect(source.bounds());
        if !(src_rect.width() > 0.0 && src_rect.height() > 0.0) {
            return;
        }
        let Some((x0, y0, x1, y1)) = self.pixel_span(dst_rect) else { return };

        let sx_scale = src_rect.width() / dst_rect.width();
        let sy_scale = src_rect.height() / dst_rect.height();
        // Integer texel range the sampler may touch.
        let tx0 = src_rect.min.x.floor() as i64;
        let ty0 = src_rect.min.y.floor() as i64;
        let tx1 = (src_rect.max.x.ceil() as i64 - 1).max(tx0);
        let ty1 = (src_rect.max.y.ceil() as i64 - 1).max(ty0);

        for y in y0..y1 {
            let v = src_rect.min.y + (y as f32 + 0.5 - dst_rect.min.y) * sy_scale;
            for x in x0..x1 {
                let u = src_rect.min.x + (x as f32 + 0.5 - dst_rect.min.x) * sx_scale;
                let sample = match filter {
                    ResampleFilter::Nearest => {
                        let sx = (u.floor() as i64).clamp(tx0, tx1);
                        let sy = (v.floor() as i64).clamp(ty0, ty1);
                        source.get_pixel_i(sx, sy)
                    }
                    ResampleFilter::Bilinear => {
                        bilinear_sample(source, u - 0.5, v - 0.5, (tx0, ty0, tx1, ty1))
                    }
                };
                if sample[3] == 0 {
                    continue;
                }
                let dst = self.get_pixel(x, y);
                self.put_pixel(x, y, source_over(dst, sample, 1.0));
            }
        }
    }

    // ---- whole-surface transforms (each returns a new surface) --------------

    /// Resample the whole surface to `new_w × new_h`.
    pub fn resized(&self, new_w: u32, new_h: u32, filter: ResampleFilter) -> EditResult<Self> {
        let mut out = Self::new(new_w, new_h)?;
        let bounds = out.bounds();
        out.draw_image(self, self.bounds(), bounds, filter);
        Ok(out)
    }

    /// Copy the `w × h` region starting at `(x, y)` into a new surface.
    /// Parts of the region outside this surface come out transparent.
    pub fn cropped(&self, x: i64, y: i64, w: u32, h: u32) -> EditResult<Self> {
        let mut out = Self::new(w, h)?;
        let src_w = self.width() as i64;
        let src_h = self.height() as i64;
        let col0 = x.max(0);
        let col1 = (x + w as i64).min(src_w);
        if col0 >= col1 {
            return Ok(out);
        }
        let src_stride = src_w as usize * 4;
        let dst_stride = w as usize * 4;
        let bytes = (col1 - col0) as usize * 4;
        let dst_col = (col0 - x) as usize * 4;
        for row in 0..h as i64 {
            let sy = y + row;
            if sy < 0 || sy >= src_h {
                continue;
            }
            let s = sy as usize * src_stride + col0 as usize * 4;
            let d = row as usize * dst_stride + dst_col;
            out.pixels_mut()[d..d + bytes].copy_from_slice(&self.pixels()[s..s + bytes]);
        }
        Ok(out)
    }

    pub fn rotated_90_cw(&self) -> Self {
        Self { image: imageops::rotate90(&self.image) }
    }

    pub fn rotated_90_ccw(&self) -> Self {
        Self { image: imageops::rotate270(&self.image) }
    }

    pub fn rotated_180(&self) -> Self {
        Self { image: imageops::rotate180(&self.image) }
    }

    pub fn flipped_horizontal(&self) -> Self {
        Self { image: imageops::flip_horizontal(&self.image) }
    }

    pub fn flipped_vertical(&self) -> Self {
        Self { image: imageops::flip_vertical(&self.image) }
    }
}

/// Bilinear interpolation at continuous texel coordinates, clamped to the
/// inclusive texel box `(x0, y0, x1, y1)`.
fn bilinear_sample(img: &PixelSurface, x: f32, y: f32, clamp: (i64, i64, i64, i64)) -> Rgba<u8> {
    let (cx0, cy0, cx1, cy1) = clamp;
    let x = x.clamp(cx0 as f32, cx1 as f32);
    let y = y.clamp(cy0 as f32, cy1 as f32);
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let x1 = (x0 + 1).min(cx1);
    let y1 = (y0 + 1).min(cy1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = img.get_pixel_i(x0, y0);
    let p10 = img.get_pixel_i(x1, y0);
    let p01 = img.get_pixel_i(x0, y1);
    let p11 = img.get_pixel_i(x1, y1);

    // Interpolate premultiplied so transparent neighbours do not darken edges.
    let w = [(1.0 - fx) * (1.0 - fy), fx * (1.0 - fy), (1.0 - fx) * fy, fx * fy];
    let px = [p00, p10, p01, p11];
    let mut acc = [0.0f32; 4];
    for (p, wt) in px.iter().zip(w) {
        let a = p[3] as f32 / 255.0;
        acc[0] += p[0] as f32 * a * wt;
        acc[1] += p[1] as f32 * a * wt;
        acc[2] += p[2] as f32 * a * wt;
        acc[3] += a * wt;
    }
    if acc[3] <= 0.0 {
        return TRANSPARENT;
    }
    Rgba([
        (acc[0] / acc[3]).round().clamp(0.0, 255.0) as u8,
        (acc[1] / acc[3]).round().clamp(0.0, 255.0) as u8,
        (acc[2] / acc[3]).round().clamp(0.0, 255.0) as u8,
        (acc[3] * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}
