use super::types::Mask;
use crate::config::AlphaMatting;
use image::{GrayImage, Rgb, RgbImage, RgbaImage};

/// Half-width of the window used to gather known colors around an unknown pixel
const ESTIMATION_RADIUS: u32 = 8;

const KNOWN_BACKGROUND: u8 = 0;
const UNKNOWN: u8 = 128;
const KNOWN_FOREGROUND: u8 = 255;

/// Apply a mask as the alpha channel, or refine it first when matting is on
pub fn cutout(image: &RgbImage, mask: &Mask, matting: &AlphaMatting) -> RgbaImage {
    if matting.enabled {
        alpha_matting_cutout(image, mask, matting)
    } else {
        naive_cutout(image, mask)
    }
}

pub fn naive_cutout(image: &RgbImage, mask: &Mask) -> RgbaImage {
    RgbaImage::from_fn(image.width(), image.height(), |x, y| {
        let Rgb([r, g, b]) = *image.get_pixel(x, y);
        image::Rgba([r, g, b, mask.get_pixel(x, y)[0]])
    })
}

/// Label each pixel as known foreground, known background or unknown
///
/// Known regions are eroded by `erode_size` pixels so the unknown band
/// widens around the mask edge.
pub fn trimap(mask: &Mask, matting: &AlphaMatting) -> GrayImage {
    let (width, height) = mask.dimensions();
    let is_foreground: Vec<bool> = mask
        .pixels()
        .map(|p| p[0] > matting.foreground_threshold)
        .collect();
    let is_background: Vec<bool> = mask
        .pixels()
        .map(|p| p[0] < matting.background_threshold)
        .collect();

    let is_foreground = erode(&is_foreground, width, height, matting.erode_size);
    let is_background = erode(&is_background, width, height, matting.erode_size);

    GrayImage::from_fn(width, height, |x, y| {
        let idx = (y * width + x) as usize;
        let label = if is_foreground[idx] {
            KNOWN_FOREGROUND
        } else if is_background[idx] {
            KNOWN_BACKGROUND
        } else {
            UNKNOWN
        };
        image::Luma([label])
    })
}

/// Binary erosion with a square window. Out-of-frame pixels count as set.
fn erode(region: &[bool], width: u32, height: u32, radius: u32) -> Vec<bool> {
    if radius == 0 {
        return region.to_vec();
    }
    let table = SummedArea::new(width, height, |idx| f64::from(u8::from(!region[idx])));
    (0..region.len())
        .map(|idx| {
            let x = idx as u32 % width;
            let y = idx as u32 / width;
            region[idx] && table.window(x, y, radius).0 == 0.0
        })
        .collect()
}

/// Refine a hard mask into soft alpha at the subject's edges
///
/// Unknown pixels get the alpha that best explains their color as a blend
/// of the mean known foreground and mean known background colors nearby.
/// Where either side has no known pixels in reach the mask value is kept.
pub fn alpha_matting_cutout(image: &RgbImage, mask: &Mask, matting: &AlphaMatting) -> RgbaImage {
    let _span = tracing::debug_span!("alpha_matting").entered();

    let (width, height) = image.dimensions();
    let trimap = trimap(mask, matting);
    let labels = trimap.as_raw();

    let channel_table = |label: u8, c: usize| {
        SummedArea::new(width, height, |idx| {
            if labels[idx] == label {
                f64::from(image.as_raw()[idx * 3 + c])
            } else {
                0.0
            }
        })
    };
    let count_table = |label: u8| {
        SummedArea::new(width, height, |idx| f64::from(u8::from(labels[idx] == label)))
    };

    let fg_count = count_table(KNOWN_FOREGROUND);
    let bg_count = count_table(KNOWN_BACKGROUND);
    let fg_sums = [0, 1, 2].map(|c| channel_table(KNOWN_FOREGROUND, c));
    let bg_sums = [0, 1, 2].map(|c| channel_table(KNOWN_BACKGROUND, c));

    let mut unknown = 0usize;
    let output = RgbaImage::from_fn(width, height, |x, y| {
        let Rgb([r, g, b]) = *image.get_pixel(x, y);
        let alpha = match trimap.get_pixel(x, y)[0] {
            KNOWN_FOREGROUND => 255,
            KNOWN_BACKGROUND => 0,
            _ => {
                unknown += 1;
                let (nf, _) = fg_count.window(x, y, ESTIMATION_RADIUS);
                let (nb, _) = bg_count.window(x, y, ESTIMATION_RADIUS);
                if nf == 0.0 || nb == 0.0 {
                    mask.get_pixel(x, y)[0]
                } else {
                    let fg = fg_sums.each_ref().map(|t| t.window(x, y, ESTIMATION_RADIUS).0 / nf);
                    let bg = bg_sums.each_ref().map(|t| t.window(x, y, ESTIMATION_RADIUS).0 / nb);
                    estimate_alpha([r, g, b], fg, bg).unwrap_or(mask.get_pixel(x, y)[0])
                }
            }
        };
        image::Rgba([r, g, b, alpha])
    });

    tracing::debug!("Alpha matting refined {} unknown pixels", unknown);
    output
}

/// Project a color onto the background→foreground color line
fn estimate_alpha(color: [u8; 3], fg: [f64; 3], bg: [f64; 3]) -> Option<u8> {
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for c in 0..3 {
        let span = fg[c] - bg[c];
        numerator += (f64::from(color[c]) - bg[c]) * span;
        denominator += span * span;
    }
    if denominator < 1.0 {
        return None;
    }
    let alpha = (numerator / denominator).clamp(0.0, 1.0);
    Some((alpha * 255.0).round() as u8)
}

/// Summed-area table for constant-time window sums
struct SummedArea {
    width: u32,
    height: u32,
    table: Vec<f64>,
}

impl SummedArea {
    fn new(width: u32, height: u32, value: impl Fn(usize) -> f64) -> Self {
        let stride = width as usize + 1;
        let mut table = vec![0.0; stride * (height as usize + 1)];
        for y in 0..height as usize {
            let mut row = 0.0;
            for x in 0..width as usize {
                row += value(y * width as usize + x);
                table[(y + 1) * stride + x + 1] = table[y * stride + x + 1] + row;
            }
        }
        Self {
            width,
            height,
            table,
        }
    }

    /// Sum over the square window centered on (x, y), clipped to the frame.
    /// Returns (sum, area).
    fn window(&self, x: u32, y: u32, radius: u32) -> (f64, u32) {
        let x0 = x.saturating_sub(radius) as usize;
        let y0 = y.saturating_sub(radius) as usize;
        let x1 = (x + radius + 1).min(self.width) as usize;
        let y1 = (y + radius + 1).min(self.height) as usize;
        let stride = self.width as usize + 1;
        let at = |xx: usize, yy: usize| self.table[yy * stride + xx];
        let sum = at(x1, y1) - at(x0, y1) - at(x1, y0) + at(x0, y0);
        (sum, ((x1 - x0) * (y1 - y0)) as u32)
    }
}
