//! FAST-9 segment test with Harris ranking and 3×3 non-maximum suppression.

use photo_align_core::ImageView;

/// Bresenham circle of radius 3, clockwise from 12 o'clock.
const CIRCLE: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

/// Contiguous arc length required by FAST-9.
const ARC: u32 = 9;

/// Half-size of the Harris window (7×7).
const HARRIS_RADIUS: i32 = 3;

/// A corner in the pixel grid of one pyramid level.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Corner {
    pub x: usize,
    pub y: usize,
    pub response: f32,
}

#[inline]
fn px(img: &ImageView<'_>, x: i32, y: i32) -> i32 {
    img.data[y as usize * img.width + x as usize] as i32
}

/// True when `mask` (16 bits, circular) has a run of at least `ARC` set bits.
#[inline]
fn has_arc(mask: u16) -> bool {
    if mask.count_ones() < ARC {
        return false;
    }
    let doubled = (mask as u32) | ((mask as u32) << 16);
    let mut run = 0;
    for i in 0..32 {
        if doubled & (1 << i) != 0 {
            run += 1;
            if run >= ARC {
                return true;
            }
        } else {
            run = 0;
        }
    }
    false
}

/// Segment test at `(x, y)`; the caller guarantees a 3-pixel margin.
pub(crate) fn is_fast_corner(img: &ImageView<'_>, x: i32, y: i32, threshold: u8) -> bool {
    let p = px(img, x, y);
    let t = threshold as i32;
    let hi = p + t;
    let lo = p - t;

    // Any 9-arc covers at least two of the four compass points.
    let mut bright = 0;
    let mut dark = 0;
    for k in [0usize, 4, 8, 12] {
        let (dx, dy) = CIRCLE[k];
        let v = px(img, x + dx, y + dy);
        if v > hi {
            bright += 1;
        } else if v < lo {
            dark += 1;
        }
    }
    if bright < 2 && dark < 2 {
        return false;
    }

    let mut bright_mask = 0u16;
    let mut dark_mask = 0u16;
    for (k, &(dx, dy)) in CIRCLE.iter().enumerate() {
        let v = px(img, x + dx, y + dy);
        if v > hi {
            bright_mask |= 1 << k;
        } else if v < lo {
            dark_mask |= 1 << k;
        }
    }
    has_arc(bright_mask) || has_arc(dark_mask)
}

/// Harris response `det(M) - k * trace(M)^2` over a 7×7 window of central
/// differences; the caller guarantees a 4-pixel margin.
pub(crate) fn harris_response(img: &ImageView<'_>, x: i32, y: i32, k: f32) -> f32 {
    let (mut sxx, mut syy, mut sxy) = (0.0f32, 0.0f32, 0.0f32);
    for dy in -HARRIS_RADIUS..=HARRIS_RADIUS {
        for dx in -HARRIS_RADIUS..=HARRIS_RADIUS {
            let cx = x + dx;
            let cy = y + dy;
            let gx = (px(img, cx + 1, cy) - px(img, cx - 1, cy)) as f32 * 0.5;
            let gy = (px(img, cx, cy + 1) - px(img, cx, cy - 1)) as f32 * 0.5;
            sxx += gx * gx;
            syy += gy * gy;
            sxy += gx * gy;
        }
    }
    // Normalize by window size so responses stay in a comparable range.
    let norm = 1.0 / ((2 * HARRIS_RADIUS + 1) * (2 * HARRIS_RADIUS + 1)) as f32;
    let (sxx, syy, sxy) = (sxx * norm, syy * norm, sxy * norm);
    let trace = sxx + syy;
    sxx * syy - sxy * sxy - k * trace * trace
}

/// Detect FAST corners at least `border` pixels from every edge, rank them by
/// Harris response and suppress non-maxima in 3×3 neighbourhoods.
///
/// The result is sorted by descending response, ties by row then column.
pub(crate) fn detect_corners(
    img: &ImageView<'_>,
    threshold: u8,
    harris_k: f32,
    border: usize,
) -> Vec<Corner> {
    let border = border.max((HARRIS_RADIUS + 1) as usize);
    let (w, h) = (img.width, img.height);
    if w <= 2 * border || h <= 2 * border {
        return Vec::new();
    }

    let mut scores = vec![f32::NEG_INFINITY; w * h];
    let mut candidates = Vec::new();
    for y in border..h - border {
        for x in border..w - border {
            if is_fast_corner(img, x as i32, y as i32, threshold) {
                let r = harris_response(img, x as i32, y as i32, harris_k);
                scores[y * w + x] = r;
                candidates.push((x, y));
            }
        }
    }

    let mut corners: Vec<Corner> = candidates
        .into_iter()
        .filter(|&(x, y)| {
            let s = scores[y * w + x];
            for ny in y - 1..=y + 1 {
                for nx in x - 1..=x + 1 {
                    if (nx, ny) == (x, y) {
                        continue;
                    }
                    let n = scores[ny * w + nx];
                    // strict on earlier neighbours, lenient on later ones: keeps
                    // exactly one of two equal adjacent maxima
                    if n > s || (n == s && (ny, nx) < (y, x)) {
                        return false;
                    }
                }
            }
            true
        })
        .map(|(x, y)| Corner {
            x,
            y,
            response: scores[y * w + x],
        })
        .collect();

    corners.sort_by(|a, b| {
        b.response
            .total_cmp(&a.response)
            .then(a.y.cmp(&b.y))
            .then(a.x.cmp(&b.x))
    });
    corners
}
