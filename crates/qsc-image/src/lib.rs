#![forbid(unsafe_code)]

//! Golden reference model for the bilinear resizer.
//!
//! Everything here is a pure function of `(width, height, scale)`: the
//! synthetic stimulus is regenerated from a formula on both sides of the
//! hardware boundary, and the resampler runs entirely in Q8.8 arithmetic so
//! its rounding matches the datapath bit for bit.

use qsc_fixed::{
    Fixed, ONE, float_to_fixed, fraction_weight, integer_part, lerp, saturate_to_byte, to_fixed,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const MIN_SCALE: f64 = 0.5;
pub const MAX_SCALE: f64 = 1.0;
pub const MIN_DIMENSION: usize = 2;
/// Keeps `output_dimension * step` inside a 32-bit position accumulator.
pub const MAX_DIMENSION: usize = 65_535;
pub const PATTERN_ROW_STRIDE: usize = 16;

pub const IMAGE_REASON_CODES: [&str; 6] = [
    "image_invalid_scalar",
    "image_scale_out_of_range",
    "image_dimension_too_small",
    "image_dimension_too_large",
    "image_size_overflow",
    "image_input_length_mismatch",
];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ImageError {
    #[error("{field} is not a number: '{raw}'")]
    InvalidScalar { field: &'static str, raw: String },
    #[error("scale {scale} outside [0.5, 1.0]")]
    ScaleOutOfRange { scale: f64 },
    #[error("{axis} must be at least 2, got {value}")]
    DimensionTooSmall { axis: &'static str, value: usize },
    #[error("{axis} must be at most 65535, got {value}")]
    DimensionTooLarge { axis: &'static str, value: usize },
    #[error("pixel count overflows for {width}x{height}")]
    Overflow { width: usize, height: usize },
    #[error("input length mismatch expected={expected} actual={actual}")]
    InputLengthMismatch { expected: usize, actual: usize },
}

impl ImageError {
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::InvalidScalar { .. } => IMAGE_REASON_CODES[0],
            Self::ScaleOutOfRange { .. } => IMAGE_REASON_CODES[1],
            Self::DimensionTooSmall { .. } => IMAGE_REASON_CODES[2],
            Self::DimensionTooLarge { .. } => IMAGE_REASON_CODES[3],
            Self::Overflow { .. } => IMAGE_REASON_CODES[4],
            Self::InputLengthMismatch { .. } => IMAGE_REASON_CODES[5],
        }
    }
}

/// Resize factor in `[0.5, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct ScaleFactor(f64);

impl ScaleFactor {
    pub fn new(value: f64) -> Result<Self, ImageError> {
        if !value.is_finite() || !(MIN_SCALE..=MAX_SCALE).contains(&value) {
            return Err(ImageError::ScaleOutOfRange { scale: value });
        }
        Ok(Self(value))
    }

    #[must_use]
    pub const fn value(self) -> f64 {
        self.0
    }

    /// Single-precision view; dimension and step arithmetic happen in `f32`.
    #[must_use]
    pub fn single(self) -> f32 {
        self.0 as f32
    }

    /// `trunc(scale * 256)`, the value carried across the hardware boundary.
    ///
    /// Truncation rather than round-to-nearest is load-bearing: the hardware
    /// side decodes the same truncated register.
    #[must_use]
    pub fn encoded(self) -> u16 {
        (self.0 * f64::from(ONE)) as u16
    }

    /// `0x`-prefixed uppercase hex of [`Self::encoded`], at least two digits.
    #[must_use]
    pub fn hex(self) -> String {
        format!("0x{:02X}", self.encoded())
    }

    /// Source step per output pixel, `1 / scale` in Q8.8 (truncated).
    #[must_use]
    pub fn step(self) -> Fixed {
        float_to_fixed(1.0 / self.single())
    }

    #[must_use]
    pub fn scaled_dimension(self, dimension: usize) -> usize {
        (dimension as f32 * self.single()) as usize
    }
}

impl TryFrom<f64> for ScaleFactor {
    type Error = ImageError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ScaleFactor> for f64 {
    fn from(scale: ScaleFactor) -> Self {
        scale.0
    }
}

impl FromStr for ScaleFactor {
    type Err = ImageError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let value = raw
            .trim()
            .parse::<f64>()
            .map_err(|_| ImageError::InvalidScalar {
                field: "scale",
                raw: raw.to_string(),
            })?;
        Self::new(value)
    }
}

impl fmt::Display for ScaleFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parses a positive integer dimension, reporting non-numeric input by name.
pub fn parse_dimension(field: &'static str, raw: &str) -> Result<usize, ImageError> {
    raw.trim()
        .parse::<usize>()
        .map_err(|_| ImageError::InvalidScalar {
            field,
            raw: raw.to_string(),
        })
}

/// Validated input geometry; only obtainable through [`ImageDims::new`] or a
/// deserializer that runs the same checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDims", into = "RawDims")]
pub struct ImageDims {
    width: usize,
    height: usize,
}

#[derive(Serialize, Deserialize)]
struct RawDims {
    width: usize,
    height: usize,
}

impl TryFrom<RawDims> for ImageDims {
    type Error = ImageError;

    fn try_from(raw: RawDims) -> Result<Self, Self::Error> {
        Self::new(raw.width, raw.height)
    }
}

impl From<ImageDims> for RawDims {
    fn from(dims: ImageDims) -> Self {
        Self {
            width: dims.width,
            height: dims.height,
        }
    }
}

impl ImageDims {
    /// Both sides must be at least 2: the four-tap neighbourhood needs a
    /// second row and column to clamp against.
    pub fn new(width: usize, height: usize) -> Result<Self, ImageError> {
        check_dimension("width", width)?;
        check_dimension("height", height)?;
        width
            .checked_mul(height)
            .ok_or(ImageError::Overflow { width, height })?;
        Ok(Self { width, height })
    }

    #[must_use]
    pub const fn width(self) -> usize {
        self.width
    }

    #[must_use]
    pub const fn height(self) -> usize {
        self.height
    }

    #[must_use]
    pub const fn pixel_count(self) -> usize {
        self.width * self.height
    }
}

fn check_dimension(axis: &'static str, value: usize) -> Result<(), ImageError> {
    if value < MIN_DIMENSION {
        return Err(ImageError::DimensionTooSmall { axis, value });
    }
    if value > MAX_DIMENSION {
        return Err(ImageError::DimensionTooLarge { axis, value });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizePlan {
    input: ImageDims,
    output_width: usize,
    output_height: usize,
    scale: ScaleFactor,
    step: Fixed,
}

impl ResizePlan {
    #[must_use]
    pub fn new(input: ImageDims, scale: ScaleFactor) -> Self {
        Self {
            input,
            output_width: scale.scaled_dimension(input.width),
            output_height: scale.scaled_dimension(input.height),
            scale,
            step: scale.step(),
        }
    }

    #[must_use]
    pub const fn input(&self) -> ImageDims {
        self.input
    }

    #[must_use]
    pub const fn output_width(&self) -> usize {
        self.output_width
    }

    #[must_use]
    pub const fn output_height(&self) -> usize {
        self.output_height
    }

    #[must_use]
    pub const fn scale(&self) -> ScaleFactor {
        self.scale
    }

    #[must_use]
    pub const fn step(&self) -> Fixed {
        self.step
    }

    #[must_use]
    pub const fn output_len(&self) -> usize {
        self.output_width * self.output_height
    }
}

#[must_use]
pub fn pattern_sample(x: usize, y: usize) -> u8 {
    (((y + 1) * PATTERN_ROW_STRIDE + x) % 256) as u8
}

/// Row-major stimulus `((y + 1) * 16 + x) mod 256`.
#[must_use]
pub fn synthesize_input(dims: ImageDims) -> Vec<u8> {
    let mut out = Vec::with_capacity(dims.pixel_count());
    for y in 0..dims.height {
        out.extend((0..dims.width).map(|x| pattern_sample(x, y)));
    }
    out
}

/// Splits a position accumulator into the top-left tap and its weight.
///
/// Taps past the last pair are pinned to `dimension - 2`; the distance pinned
/// away is added back as whole samples of weight so the addressed sample is
/// still the one produced.
fn clamp_tap(acc: i32, dimension: usize) -> (usize, Fixed) {
    let last_pair = dimension - 2;
    let coord = usize::try_from(integer_part(acc)).unwrap_or(0);
    let weight = fraction_weight(acc);
    if coord > last_pair {
        let carry = (coord - last_pair) as i32;
        (
            last_pair,
            weight.wrapping_add(Fixed::from_raw(carry.wrapping_mul(ONE))),
        )
    } else {
        (coord, weight)
    }
}

pub fn resample(plan: &ResizePlan, input: &[u8]) -> Result<Vec<u8>, ImageError> {
    let expected = plan.input.pixel_count();
    if input.len() != expected {
        return Err(ImageError::InputLengthMismatch {
            expected,
            actual: input.len(),
        });
    }

    let width = plan.input.width;
    let height = plan.input.height;
    let step = plan.step.raw();
    let mut out = Vec::with_capacity(plan.output_len());

    let mut src_acc_y: i32 = 0;
    for _ in 0..plan.output_height {
        let (sy, fy) = clamp_tap(src_acc_y, height);
        let upper = sy * width;
        let lower = upper + width;

        let mut src_acc_x: i32 = 0;
        for _ in 0..plan.output_width {
            let (sx, fx) = clamp_tap(src_acc_x, width);

            let p00 = to_fixed(input[upper + sx]);
            let p10 = to_fixed(input[upper + sx + 1]);
            let p01 = to_fixed(input[lower + sx]);
            let p11 = to_fixed(input[lower + sx + 1]);

            let top = lerp(p00, p10, fx);
            let bottom = lerp(p01, p11, fx);
            out.push(saturate_to_byte(lerp(top, bottom, fy)));

            src_acc_x = src_acc_x.wrapping_add(step);
        }
        src_acc_y = src_acc_y.wrapping_add(step);
    }

    Ok(out)
}

/// Stimulus and golden output of one run. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    plan: ResizePlan,
    input: Vec<u8>,
    golden: Vec<u8>,
}

impl ModelOutput {
    #[must_use]
    pub fn plan(&self) -> &ResizePlan {
        &self.plan
    }

    #[must_use]
    pub fn input(&self) -> &[u8] {
        &self.input
    }

    #[must_use]
    pub fn golden(&self) -> &[u8] {
        &self.golden
    }

    #[must_use]
    pub fn golden_as_ints(&self) -> Vec<i64> {
        self.golden.iter().map(|&v| i64::from(v)).collect()
    }

    /// `(golden, input)`.
    #[must_use]
    pub fn into_parts(self) -> (Vec<u8>, Vec<u8>) {
        (self.golden, self.input)
    }
}

pub fn generate_with(dims: ImageDims, scale: ScaleFactor) -> Result<ModelOutput, ImageError> {
    let plan = ResizePlan::new(dims, scale);
    let input = synthesize_input(dims);
    let golden = resample(&plan, &input)?;
    Ok(ModelOutput {
        plan,
        input,
        golden,
    })
}

pub fn generate(width: usize, height: usize, scale: f64) -> Result<ModelOutput, ImageError> {
    generate_with(ImageDims::new(width, height)?, ScaleFactor::new(scale)?)
}
