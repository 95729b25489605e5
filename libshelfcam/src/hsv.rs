use opencv::core::{self, AlgorithmHint, Mat, Point, Scalar, Vec3b};
use opencv::imgproc;
use opencv::prelude::*;

use super::error::HsvError;

/// OpenCV stores 8-bit hue as degrees / 2
pub const HUE_MAX: i32 = 179;
pub const SAT_VAL_MAX: i32 = 255;

/// Inclusive HSV limits.
///
/// Hue is circular: with `h_min > h_max` the range wraps through 0, so
/// `h_min = 170, h_max = 10` selects reds on both sides of the hue origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HsvRange {
    pub h_min: i32,
    pub h_max: i32,
    pub s_min: i32,
    pub s_max: i32,
    pub v_min: i32,
    pub v_max: i32,
}

impl Default for HsvRange {
    fn default() -> Self {
        Self {
            h_min: 0,
            h_max: HUE_MAX,
            s_min: 0,
            s_max: SAT_VAL_MAX,
            v_min: 0,
            v_max: SAT_VAL_MAX,
        }
    }
}

impl HsvRange {
    pub fn wraps(&self) -> bool {
        self.h_min > self.h_max
    }

    /// Lower/upper bound pairs to pass to `in_range`; two pairs when the hue wraps
    fn bounds(&self) -> Vec<(Scalar, Scalar)> {
        let bound = |h_lo: i32, h_hi: i32| {
            (
                Scalar::new(h_lo as f64, self.s_min as f64, self.v_min as f64, 0.0),
                Scalar::new(h_hi as f64, self.s_max as f64, self.v_max as f64, 0.0),
            )
        };
        if self.wraps() {
            vec![bound(self.h_min, HUE_MAX), bound(0, self.h_max)]
        } else {
            vec![bound(self.h_min, self.h_max)]
        }
    }
}

impl std::fmt::Display for HsvRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "H: {}-{}, S: {}-{}, V: {}-{}",
            self.h_min, self.h_max, self.s_min, self.s_max, self.v_min, self.v_max
        )
    }
}

pub fn to_hsv(bgr: &Mat) -> Result<Mat, HsvError> {
    let mut hsv = Mat::default();
    imgproc::cvt_color(bgr, &mut hsv, imgproc::COLOR_BGR2HSV, 0, AlgorithmHint::ALGO_HINT_DEFAULT)?;
    Ok(hsv)
}

/// 8-bit mask (255 = inside) of the pixels of an HSV image within `range`
pub fn threshold_mask(hsv: &Mat, range: &HsvRange) -> Result<Mat, HsvError> {
    let mut mask = Mat::default();
    for (lower, upper) in range.bounds() {
        let mut part = Mat::default();
        core::in_range(hsv, &lower, &upper, &mut part)?;
        if mask.empty() {
            mask = part;
        } else {
            let mut combined = Mat::default();
            core::bitwise_or(&mask, &part, &mut combined, &core::no_array())?;
            mask = combined;
        }
    }
    Ok(mask)
}

/// The BGR image with every pixel outside `range` blacked out
pub fn threshold(bgr: &Mat, hsv: &Mat, range: &HsvRange) -> Result<Mat, HsvError> {
    let mask = threshold_mask(hsv, range)?;
    let mut out = Mat::default();
    core::bitwise_and(bgr, bgr, &mut out, &mask)?;
    Ok(out)
}

/// HSV value at `pixel`, clamped into the image
pub fn pixel_hsv(hsv: &Mat, pixel: Point) -> Result<Vec3b, HsvError> {
    let x = pixel.x.clamp(0, (hsv.cols() - 1).max(0));
    let y = pixel.y.clamp(0, (hsv.rows() - 1).max(0));
    Ok(*hsv.at_2d::<Vec3b>(y, x)?)
}

const PROBE_RADIUS: i32 = 3;
const PROBE_THICKNESS: i32 = 2;

/// Mark the probed pixel and print its HSV value next to the current limits
pub fn draw_probe(out: &mut Mat, pixel: Point, value: Vec3b, range: &HsvRange) -> Result<(), HsvError> {
    let color = Scalar::new(255.0, 0.0, 0.0, 0.0);
    imgproc::circle(out, pixel, PROBE_RADIUS, color, PROBE_THICKNESS, imgproc::LINE_8, 0)?;
    let text = format!(
        "({}, {}) - [{} {} {}] ({range})",
        pixel.x, pixel.y, value[0], value[1], value[2]
    );
    imgproc::put_text(
        out,
        &text,
        Point::new(10, 30),
        imgproc::FONT_HERSHEY_DUPLEX,
        0.6,
        color,
        1,
        imgproc::LINE_AA,
        false,
    )?;
    Ok(())
}
