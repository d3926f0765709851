//! Brightness focus extraction.
//!
//! Finds the centre of the brightest connected region of a frame:
//! 1. greyscale with (299, 587, 114) per-mille channel weights, rounded to 8 bits
//! 2. Gaussian blur with `sigma = round(max(width, height) / blur_index)`,
//!    approximated by three box passes
//! 3. threshold at the blurred image mean (strictly greater is bright)
//! 4. label connected bright regions
//! 5. weight each region by blurred intensity (or pixel count), background excluded
//! 6. centre of mass of the heaviest region over the same weighting
//!
//! Coordinates are pixel-space with y growing downward from the top row.

use anyhow::{anyhow, Result};
use serde::Deserialize;

use super::labels::{label_components, ComponentLabels, Connectivity};
use crate::frame::{Frame, PixelLayout};

/// Per-mille channel weights for greyscale conversion.
const GREYSCALE_WEIGHTS: [u32; 3] = [299, 587, 114];

pub const DEFAULT_BLUR_INDEX: f64 = 15.0;

/// How pixels inside a bright region contribute to its weight and centroid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weighting {
    /// Sum of blurred intensities.
    #[default]
    Mass,
    /// Pixel count; every bright pixel weighs the same.
    Uniform,
}

/// Pixel-space centroid of the brightest region, tagged with its frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FocusPoint {
    pub sequence: u64,
    pub x: f64,
    pub y: f64,
    pub frame_width: u32,
    pub frame_height: u32,
}

/// Intermediate images of one extraction, mostly useful for inspection and tests.
#[derive(Clone, Debug)]
pub struct BrightAreas {
    pub width: usize,
    pub height: usize,
    pub grey: Vec<u8>,
    pub blurred: Vec<f64>,
    pub mask: Vec<bool>,
    pub components: ComponentLabels,
}

#[derive(Clone, Debug)]
pub struct BrightnessFocus {
    blur_index: f64,
    weighting: Weighting,
    connectivity: Connectivity,
}

impl Default for BrightnessFocus {
    fn default() -> Self {
        Self::new(DEFAULT_BLUR_INDEX, Weighting::Mass, Connectivity::Four)
    }
}

impl BrightnessFocus {
    /// Larger `blur_index` means less blurring.
    pub fn new(blur_index: f64, weighting: Weighting, connectivity: Connectivity) -> Self {
        Self {
            blur_index,
            weighting,
            connectivity,
        }
    }

    pub fn blur_sigma(&self, width: u32, height: u32) -> f64 {
        (width.max(height) as f64 / self.blur_index).round()
    }

    pub fn bright_areas(&self, frame: &Frame) -> Result<BrightAreas> {
        if self.blur_index <= 0.0 || !self.blur_index.is_finite() {
            return Err(anyhow!("blur index must be positive, got {}", self.blur_index));
        }
        let width = frame.width as usize;
        let height = frame.height as usize;
        let grey = greyscale(frame);
        let sigma = self.blur_sigma(frame.width, frame.height);
        let blurred = gaussian_blur(&grey, width, height, sigma);
        let mean = blurred.iter().sum::<f64>() / blurred.len() as f64;
        let mask: Vec<bool> = blurred.iter().map(|&v| v > mean).collect();
        let components = label_components(&mask, width, height, self.connectivity);
        Ok(BrightAreas {
            width,
            height,
            grey,
            blurred,
            mask,
            components,
        })
    }

    pub fn locate(&self, frame: &Frame) -> Result<FocusPoint> {
        let areas = self.bright_areas(frame)?;
        let weights: Vec<f64> = match self.weighting {
            Weighting::Mass => areas.blurred.clone(),
            Weighting::Uniform => areas
                .mask
                .iter()
                .map(|&bright| if bright { 1.0 } else { 0.0 })
                .collect(),
        };

        let (x, y) = match heaviest_component(&areas.components, &weights) {
            Some(label) => {
                centre_of_mass(&weights, areas.width, |i| areas.components.labels[i] == label)
            }
            None => centre_of_mass(&weights, areas.width, |_| true),
        }
        .unwrap_or((
            (areas.width as f64 - 1.0) / 2.0,
            (areas.height as f64 - 1.0) / 2.0,
        ));

        Ok(FocusPoint {
            sequence: frame.sequence,
            x,
            y,
            frame_width: frame.width,
            frame_height: frame.height,
        })
    }
}

fn greyscale(frame: &Frame) -> Vec<u8> {
    match frame.layout() {
        PixelLayout::Grey => frame.samples().to_vec(),
        PixelLayout::Rgb => {
            let total: u32 = GREYSCALE_WEIGHTS.iter().sum();
            frame
                .samples()
                .chunks_exact(3)
                .map(|px| {
                    let sum = GREYSCALE_WEIGHTS[0] * px[0] as u32
                        + GREYSCALE_WEIGHTS[1] * px[1] as u32
                        + GREYSCALE_WEIGHTS[2] * px[2] as u32;
                    ((sum + total / 2) / total) as u8
                })
                .collect()
        }
    }
}

/// Box passes approximating one Gaussian.
const BLUR_PASSES: usize = 3;

/// Odd box widths whose successive application approximates a Gaussian of
/// the given sigma (Wells, 1986).
fn box_widths(sigma: f64) -> [usize; BLUR_PASSES] {
    let n = BLUR_PASSES as f64;
    let ideal = (12.0 * sigma * sigma / n + 1.0).sqrt();
    let mut lower = ideal.floor() as usize;
    if lower % 2 == 0 {
        lower = lower.saturating_sub(1).max(1);
    }
    let upper = lower + 2;
    let wl = lower as f64;
    let split = ((12.0 * sigma * sigma - n * wl * wl - 4.0 * n * wl - 3.0 * n)
        / (-4.0 * wl - 4.0))
        .round();
    let mut widths = [lower; BLUR_PASSES];
    for (i, width) in widths.iter_mut().enumerate() {
        if i as f64 >= split {
            *width = upper;
        }
    }
    widths
}

/// Mirror an out-of-range index back into `0..len` ("d c b a | a b c d").
fn reflect(index: i64, len: usize) -> usize {
    let len = len as i64;
    let period = 2 * len;
    let m = index.rem_euclid(period);
    if m < len {
        m as usize
    } else {
        (period - 1 - m) as usize
    }
}

/// Sliding window sum of width `2 * radius + 1` along one line.
fn running_sum(
    get: impl Fn(usize) -> u128,
    len: usize,
    radius: usize,
    mut put: impl FnMut(usize, u128),
) {
    let r = radius as i64;
    let mut sum: u128 = (-r..=r).map(|k| get(reflect(k, len))).sum();
    put(0, sum);
    for i in 1..len as i64 {
        sum += get(reflect(i + r, len));
        sum -= get(reflect(i - r - 1, len));
        put(i as usize, sum);
    }
}

/// Gaussian blur as three separable box passes with mirrored borders.
///
/// Cost is independent of sigma. Window sums stay exact integers until the
/// final division, so a flat image stays exactly flat. `sigma < 0.5` leaves
/// the image untouched apart from the conversion to floating point.
fn gaussian_blur(grey: &[u8], width: usize, height: usize, sigma: f64) -> Vec<f64> {
    if sigma < 0.5 {
        return grey.iter().map(|&v| v as f64).collect();
    }
    let mut current: Vec<u128> = grey.iter().map(|&v| v as u128).collect();
    let mut scratch = vec![0u128; current.len()];
    let mut scale = 1.0f64;

    for box_width in box_widths(sigma) {
        let radius = box_width / 2;
        for y in 0..height {
            let row = &current[y * width..(y + 1) * width];
            let out = &mut scratch[y * width..(y + 1) * width];
            running_sum(|x| row[x], width, radius, |x, v| out[x] = v);
        }
        for x in 0..width {
            running_sum(
                |y| scratch[y * width + x],
                height,
                radius,
                |y, v| current[y * width + x] = v,
            );
        }
        scale *= (box_width * box_width) as f64;
    }
    current.iter().map(|&v| v as f64 / scale).collect()
}

fn heaviest_component(components: &ComponentLabels, weights: &[f64]) -> Option<u32> {
    if components.count == 0 {
        return None;
    }
    let mut totals = vec![0.0f64; components.count as usize + 1];
    for (label, weight) in components.labels.iter().zip(weights) {
        totals[*label as usize] += weight;
    }
    totals[0] = 0.0;
    // First maximum wins, so ties resolve to the lowest label.
    let mut best = 1usize;
    for (label, &total) in totals.iter().enumerate().skip(1) {
        if total > totals[best] {
            best = label;
        }
    }
    Some(best as u32)
}

fn centre_of_mass(
    weights: &[f64],
    width: usize,
    include: impl Fn(usize) -> bool,
) -> Option<(f64, f64)> {
    let mut total = 0.0;
    let mut sx = 0.0;
    let mut sy = 0.0;
    for (i, &w) in weights.iter().enumerate() {
        if !include(i) {
            continue;
        }
        total += w;
        sx += w * (i % width) as f64;
        sy += w * (i / width) as f64;
    }
    if total > 0.0 {
        Some((sx / total, sy / total))
    } else {
        None
    }
}
