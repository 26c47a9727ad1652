use crate::bounds::BoundingRect;

/// Borrowed interleaved 8-bit raster, row-major, `len = width * height * channels`.
#[derive(Clone, Copy, Debug)]
pub struct ImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub data: &'a [u8],
}

/// Owned interleaved 8-bit raster (1 = gray, 3 = RGB, 4 = RGBA).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub data: Vec<u8>,
}

impl Image {
    /// Black image.
    pub fn new(width: usize, height: usize, channels: usize) -> Self {
        Self {
            width,
            height,
            channels,
            data: vec![0u8; width * height * channels],
        }
    }

    /// Wrap a raw buffer; `None` if its length does not match the shape.
    pub fn from_raw(width: usize, height: usize, channels: usize, data: Vec<u8>) -> Option<Self> {
        let expected = width.checked_mul(height)?.checked_mul(channels)?;
        if channels == 0 || data.len() != expected {
            return None;
        }
        Some(Self {
            width,
            height,
            channels,
            data,
        })
    }

    pub fn from_fn(
        width: usize,
        height: usize,
        channels: usize,
        mut f: impl FnMut(usize, usize, usize) -> u8,
    ) -> Self {
        let mut data = Vec::with_capacity(width * height * channels);
        for y in 0..height {
            for x in 0..width {
                for c in 0..channels {
                    data.push(f(x, y, c));
                }
            }
        }
        Self {
            width,
            height,
            channels,
            data,
        }
    }

    #[inline]
    pub fn view(&self) -> ImageView<'_> {
        ImageView {
            width: self.width,
            height: self.height,
            channels: self.channels,
            data: &self.data,
        }
    }

    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> &[u8] {
        let i = (y * self.width + x) * self.channels;
        &self.data[i..i + self.channels]
    }

    /// Copy out `rect`, clipped to the image.
    pub fn crop(&self, rect: &BoundingRect) -> Image {
        let r = rect.intersect(&BoundingRect::full(self.width, self.height));
        let (w, h) = (r.width(), r.height());
        let mut out = Image::new(w, h, self.channels);
        if w == 0 || h == 0 {
            return out;
        }
        let row_len = w * self.channels;
        for (dy, y) in (r.y_min as usize..r.y_max as usize).enumerate() {
            let src = (y * self.width + r.x_min as usize) * self.channels;
            let dst = dy * row_len;
            out.data[dst..dst + row_len].copy_from_slice(&self.data[src..src + row_len]);
        }
        out
    }

    /// Place this image at the top-left of a black `width × height` canvas,
    /// clipping whatever does not fit.
    pub fn on_canvas(&self, width: usize, height: usize) -> Image {
        if width == self.width && height == self.height {
            return self.clone();
        }
        let mut out = Image::new(width, height, self.channels);
        let w = width.min(self.width);
        let row_len = w * self.channels;
        for y in 0..height.min(self.height) {
            let src = y * self.width * self.channels;
            let dst = y * width * self.channels;
            out.data[dst..dst + row_len].copy_from_slice(&self.data[src..src + row_len]);
        }
        out
    }

    /// Single-channel luma (`0.299 R + 0.587 G + 0.114 B`); alpha is ignored.
    pub fn to_gray(&self) -> Image {
        if self.channels == 1 {
            return self.clone();
        }
        let data = self
            .data
            .chunks_exact(self.channels)
            .map(|px| {
                if self.channels >= 3 {
                    luma([px[0], px[1], px[2]])
                } else {
                    px[0]
                }
            })
            .collect();
        Image {
            width: self.width,
            height: self.height,
            channels: 1,
            data,
        }
    }

    /// Convert to `channels` (1 = gray, 2 = gray + alpha, 3 = RGB, 4 = RGBA).
    ///
    /// Gray is replicated into colour, colour goes to luma, and a missing
    /// alpha channel becomes opaque.
    pub fn to_channels(&self, channels: usize) -> Image {
        if channels == self.channels {
            return self.clone();
        }
        if channels == 1 {
            return self.to_gray();
        }
        let mut data = Vec::with_capacity(self.width * self.height * channels);
        for px in self.data.chunks_exact(self.channels) {
            let (rgb, alpha) = match self.channels {
                1 => ([px[0]; 3], 255),
                2 => ([px[0]; 3], px[1]),
                3 => ([px[0], px[1], px[2]], 255),
                _ => ([px[0], px[1], px[2]], px[3]),
            };
            match channels {
                2 => data.extend_from_slice(&[luma(rgb), alpha]),
                3 => data.extend_from_slice(&rgb),
                _ => {
                    data.extend_from_slice(&rgb);
                    data.push(alpha);
                    data.extend(std::iter::repeat(0).take(channels.saturating_sub(4)));
                }
            }
        }
        Image {
            width: self.width,
            height: self.height,
            channels,
            data,
        }
    }
}

#[inline]
fn luma(rgb: [u8; 3]) -> u8 {
    let v = 0.299 * rgb[0] as f32 + 0.587 * rgb[1] as f32 + 0.114 * rgb[2] as f32;
    v.round().clamp(0.0, 255.0) as u8
}

#[inline]
fn get_channel(src: &ImageView<'_>, x: i32, y: i32, c: usize) -> u8 {
    if x < 0 || y < 0 || x >= src.width as i32 || y >= src.height as i32 {
        return 0;
    }
    src.data[(y as usize * src.width + x as usize) * src.channels + c]
}

/// Bilinear sample of channel `c` with integer coordinates at pixel centers.
/// Taps outside the image read as 0.
#[inline]
pub fn sample_bilinear_channel(src: &ImageView<'_>, x: f32, y: f32, c: usize) -> f32 {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = get_channel(src, x0, y0, c) as f32;
    let p10 = get_channel(src, x0 + 1, y0, c) as f32;
    let p01 = get_channel(src, x0, y0 + 1, c) as f32;
    let p11 = get_channel(src, x0 + 1, y0 + 1, c) as f32;

    let a = p00 + fx * (p10 - p00);
    let b = p01 + fx * (p11 - p01);
    a + fy * (b - a)
}

/// Bilinear sample of the first channel.
#[inline]
pub fn sample_bilinear(src: &ImageView<'_>, x: f32, y: f32) -> f32 {
    sample_bilinear_channel(src, x, y, 0)
}
