use anyhow::{Result, ensure};

/// Colour key skipped by sprite blits.
pub const TRANSPARENT: u16 = 0x0000;

/// Half-open rectangle (`right`/`bottom` are exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub const fn from_size(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    pub const fn width(&self) -> i32 {
        self.right - self.left
    }

    pub const fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub const fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    pub const fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }

    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let rect = Rect::new(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        );
        (!rect.is_empty()).then_some(rect)
    }

    pub const fn translate(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(
            self.left + dx,
            self.top + dy,
            self.right + dx,
            self.bottom + dy,
        )
    }
}

/// Options applied while copying one surface onto another.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlitOptions {
    pub transparent: Option<u16>,
    pub flip_x: bool,
}

impl BlitOptions {
    pub const OPAQUE: BlitOptions = BlitOptions {
        transparent: None,
        flip_x: false,
    };

    pub const SPRITE: BlitOptions = BlitOptions {
        transparent: Some(TRANSPARENT),
        flip_x: false,
    };
}

/// 16-bit (RGB555) pixel surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    width: usize,
    height: usize,
    pixels: Vec<u16>,
}

impl Surface {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width * height],
        }
    }

    pub fn from_pixels(width: usize, height: usize, pixels: Vec<u16>) -> Result<Self> {
        ensure!(
            pixels.len() == width * height,
            "surface of {width}x{height} needs {} pixels, got {}",
            width * height,
            pixels.len()
        );
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    pub fn bounds(&self) -> Rect {
        Rect::from_size(0, 0, self.width as i32, self.height as i32)
    }

    pub fn pixels(&self) -> &[u16] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u16] {
        &mut self.pixels
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<u16> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.pixels[y * self.width + x])
    }

    pub fn set_pixel(&mut self, x: usize, y: usize, color: u16) {
        if x < self.width && y < self.height {
            self.pixels[y * self.width + x] = color;
        }
    }

    pub fn fill(&mut self, color: u16) {
        self.pixels.fill(color);
    }

    /// Copy `src_rect` of `src` to `(dst_x, dst_y)`, clipped to this surface.
    pub fn blit(
        &mut self,
        src: &Surface,
        src_rect: Rect,
        dst_x: i32,
        dst_y: i32,
        options: BlitOptions,
    ) {
        let Some(src_rect) = src_rect.intersect(&src.bounds()) else {
            return;
        };

        for sy in src_rect.top..src_rect.bottom {
            let dy = dst_y + (sy - src_rect.top);
            if dy < 0 || dy >= self.height as i32 {
                continue;
            }
            let src_row = sy as usize * src.width;
            let dst_row = dy as usize * self.width;
            for column in 0..src_rect.width() {
                let dx = dst_x + column;
                if dx < 0 || dx >= self.width as i32 {
                    continue;
                }
                let sx = if options.flip_x {
                    src_rect.right - 1 - column
                } else {
                    src_rect.left + column
                };
                let color = src.pixels[src_row + sx as usize];
                if options.transparent == Some(color) {
                    continue;
                }
                self.pixels[dst_row + dx as usize] = color;
            }
        }
    }

    /// Scale every channel by `level / 255`.
    pub fn dim(&mut self, level: u8) {
        if level == u8::MAX {
            return;
        }
        let scale = u32::from(level);
        for pixel in &mut self.pixels {
            let r = ((u32::from(*pixel) >> 10) & 0x1F) * scale / 255;
            let g = ((u32::from(*pixel) >> 5) & 0x1F) * scale / 255;
            let b = (u32::from(*pixel) & 0x1F) * scale / 255;
            *pixel = ((r << 10) | (g << 5) | b) as u16;
        }
    }

    pub fn to_rgba(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pixels.len() * 4);
        for &pixel in &self.pixels {
            out.extend_from_slice(&rgb555_to_rgba(pixel));
        }
        out
    }
}

/// Expand a 555 pixel to 8-bit RGBA.
pub fn rgb555_to_rgba(pixel: u16) -> [u8; 4] {
    let r = ((pixel >> 10) & 0x1F) as u8;
    let g = ((pixel >> 5) & 0x1F) as u8;
    let b = (pixel & 0x1F) as u8;
    [
        (r << 3) | (r >> 2),
        (g << 3) | (g >> 2),
        (b << 3) | (b >> 2),
        255,
    ]
}

pub fn rgb_to_rgb555(r: u8, g: u8, b: u8) -> u16 {
    (u16::from(r >> 3) << 10) | (u16::from(g >> 3) << 5) | u16::from(b >> 3)
}

/// 256-entry table of 16-bit colours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: [u16; 256],
}

impl Default for Palette {
    fn default() -> Self {
        Self { colors: [0; 256] }
    }
}

impl Palette {
    #[inline]
    pub fn color(&self, index: u8) -> u16 {
        self.colors[index as usize]
    }

    pub fn set(&mut self, index: u8, color: u16) {
        self.colors[index as usize] = color;
    }

    /// Load up to 256 little-endian entries; entries past the payload keep their value.
    pub fn load_le(&mut self, bytes: &[u8]) -> usize {
        let count = (bytes.len() / 2).min(self.colors.len());
        for (slot, pair) in self.colors.iter_mut().zip(bytes.chunks_exact(2)).take(count) {
            *slot = u16::from_le_bytes([pair[0], pair[1]]);
        }
        count
    }

    pub fn colors(&self) -> &[u16; 256] {
        &self.colors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blit_clips_and_skips_transparent_pixels() {
        let mut dst = Surface::new(4, 4);
        dst.fill(0x1111);
        let src = Surface::from_pixels(2, 2, vec![0x7FFF, TRANSPARENT, 0x001F, 0x03E0]).unwrap();

        dst.blit(&src, src.bounds(), 3, 3, BlitOptions::SPRITE);
        assert_eq!(dst.pixel(3, 3), Some(0x7FFF));
        assert_eq!(dst.pixel(2, 3), Some(0x1111));

        dst.blit(&src, src.bounds(), 0, 0, BlitOptions::SPRITE);
        assert_eq!(dst.pixel(0, 0), Some(0x7FFF));
        assert_eq!(dst.pixel(1, 0), Some(0x1111));
        assert_eq!(dst.pixel(1, 1), Some(0x03E0));
    }

    #[test]
    fn flipped_blit_mirrors_rows() {
        let mut dst = Surface::new(2, 1);
        let src = Surface::from_pixels(2, 1, vec![1, 2]).unwrap();
        dst.blit(
            &src,
            src.bounds(),
            0,
            0,
            BlitOptions {
                transparent: None,
                flip_x: true,
            },
        );
        assert_eq!(dst.pixels(), &[2, 1]);
    }

    #[test]
    fn dim_to_zero_blackens() {
        let mut surface = Surface::from_pixels(1, 1, vec![0x7FFF]).unwrap();
        surface.dim(0);
        assert_eq!(surface.pixel(0, 0), Some(0));
    }

    #[test]
    fn rgb555_round_trips_through_rgba() {
        let color = rgb_to_rgb555(0xF8, 0x80, 0x08);
        let rgba = rgb555_to_rgba(color);
        assert_eq!(rgb_to_rgb555(rgba[0], rgba[1], rgba[2]), color);
    }
}
