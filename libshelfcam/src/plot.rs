use opencv::core::{Mat, Point, Rect, Scalar, Size, Vector, CV_8UC3};
use opencv::imgproc;
use opencv::prelude::*;

use super::error::PlotError;
use super::timestamp::elapsed_label;
use super::weights::{WeightSeries, WeightTrace};

/// Plot size when only one sensor is drawn below or beside a single camera
pub const COMPACT_PLOT_SIZE: Size = Size {
    width: 400,
    height: 200,
};
/// Plot size for stacked shelves beside a multicam video
pub const TALL_PLOT_SIZE: Size = Size {
    width: 350,
    height: 500,
};

const MARGIN_LEFT: i32 = 48;
const MARGIN_RIGHT: i32 = 10;
const MARGIN_TOP: i32 = 18;
const MARGIN_BOTTOM: i32 = 6;
/// Extra room under the last panel for the time labels
const AXIS_LABEL_HEIGHT: i32 = 16;
const TICK_LENGTH: i32 = 3;
const DASH_LENGTH: i32 = 4;
const MAX_X_TICKS: f64 = 6.0;
const TICK_STEPS_S: [f64; 10] = [0.1, 0.2, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 300.0];

const FONT: i32 = imgproc::FONT_HERSHEY_SIMPLEX;
const FONT_SCALE: f64 = 0.35;

fn white() -> Scalar {
    Scalar::all(255.0)
}

fn black() -> Scalar {
    Scalar::all(0.0)
}

fn gray() -> Scalar {
    Scalar::all(110.0)
}

/// Line color, in BGR
fn trace_color() -> Scalar {
    Scalar::new(180.0, 119.0, 31.0, 0.0)
}

/// Renders weight-vs-time plots around a moving instant.
///
/// One panel per trace, stacked vertically and sharing the time axis. The x axis
/// shows time elapsed since the first weight sample. The background (titles and
/// frames) never changes, so it is drawn once and reused.
pub struct WeightPlot {
    elapsed: Vec<f64>,
    traces: Vec<WeightTrace>,
    y_limits: Vec<(f64, f64)>,
    panels: Vec<Rect>,
    background: Mat,
}

impl WeightPlot {
    /// Pick the plot size: tall for stacked shelves next to a multicam video
    pub fn default_size(series: &WeightSeries, multicam: bool) -> Size {
        if multicam && series.traces.len() > 1 {
            TALL_PLOT_SIZE
        } else {
            COMPACT_PLOT_SIZE
        }
    }

    pub fn new(series: &WeightSeries, size: Size) -> Result<Self, PlotError> {
        if series.traces.is_empty() {
            return Err(PlotError::NoSeries);
        }
        let n_panels = series.traces.len() as i32;
        let panel_height = (size.height - AXIS_LABEL_HEIGHT) / n_panels;
        let panels: Vec<Rect> = (0..n_panels)
            .map(|i| {
                Rect::new(
                    MARGIN_LEFT,
                    i * panel_height + MARGIN_TOP,
                    (size.width - MARGIN_LEFT - MARGIN_RIGHT).max(1),
                    (panel_height - MARGIN_TOP - MARGIN_BOTTOM).max(1),
                )
            })
            .collect();
        let y_limits = series.traces.iter().map(|t| y_limits(&t.values)).collect();

        let mut plot = Self {
            elapsed: series.elapsed_seconds(),
            traces: series.traces.clone(),
            y_limits,
            panels,
            background: Mat::new_rows_cols_with_default(size.height, size.width, CV_8UC3, white())?,
        };
        plot.draw_background()?;
        Ok(plot)
    }

    pub fn size(&self) -> Result<Size, PlotError> {
        Ok(self.background.size()?)
    }

    fn draw_background(&mut self) -> Result<(), PlotError> {
        for (panel, (trace, (y_min, y_max))) in self
            .panels
            .iter()
            .zip(self.traces.iter().zip(self.y_limits.iter()))
        {
            let mut baseline = 0;
            let title_size = imgproc::get_text_size(&trace.title, FONT, FONT_SCALE, 1, &mut baseline)?;
            let title_origin = Point::new(
                panel.x + (panel.width - title_size.width) / 2,
                panel.y - 5,
            );
            draw_text(&mut self.background, &trace.title, title_origin)?;
            draw_text(
                &mut self.background,
                "(g)",
                Point::new(2, panel.y - 5),
            )?;

            // Weight ticks at the bottom, middle and top of the panel
            for (frac, value) in [(0.0, *y_min), (0.5, (y_min + y_max) / 2.0), (1.0, *y_max)] {
                let y = panel.y + panel.height - (frac * panel.height as f64) as i32;
                imgproc::line(
                    &mut self.background,
                    Point::new(panel.x - TICK_LENGTH, y),
                    Point::new(panel.x, y),
                    black(),
                    1,
                    imgproc::LINE_8,
                    0,
                )?;
                draw_text(
                    &mut self.background,
                    &format!("{value:.0}"),
                    Point::new(2, y + 4),
                )?;
            }
        }
        Ok(())
    }

    /// Draw the plots windowed to `[center_s - half_width_s, center_s + half_width_s]`
    /// with a dashed marker at `center_s`. Times are seconds since the first weight sample.
    ///
    /// A window outside the recorded data just gives empty panels.
    pub fn render(&self, center_s: f64, half_width_s: f64) -> Result<Mat, PlotError> {
        let half_width_s = if half_width_s > 0.0 { half_width_s } else { 1.0 };
        let x_min = center_s - half_width_s;
        let x_max = center_s + half_width_s;
        let mut img = self.background.try_clone()?;

        // Include one sample either side so lines run to the edges of the panel
        let first = self.elapsed.partition_point(|&t| t < x_min).saturating_sub(1);
        let last = (self.elapsed.partition_point(|&t| t <= x_max) + 1).min(self.elapsed.len());

        let ticks = x_ticks(x_min, x_max);
        let n_panels = self.panels.len();
        for (idx, (panel, (trace, limits))) in self
            .panels
            .iter()
            .zip(self.traces.iter().zip(self.y_limits.iter()))
            .enumerate()
        {
            let to_x = |t: f64| ((t - x_min) / (x_max - x_min) * panel.width as f64).round() as i32;
            let (y_min, y_max) = *limits;
            let to_y = |v: f64| {
                panel.height - ((v - y_min) / (y_max - y_min) * panel.height as f64).round() as i32
            };

            {
                // Drawing through the panel ROI clips lines to the panel
                let mut area = Mat::roi_mut(&mut img, *panel)?;
                if first < last {
                    let points: Vector<Point> = (first..last)
                        .map(|i| Point::new(to_x(self.elapsed[i]), to_y(trace.values[i])))
                        .collect();
                    imgproc::polylines(
                        &mut area,
                        &points,
                        false,
                        trace_color(),
                        1,
                        imgproc::LINE_AA,
                        0,
                    )?;
                }
                draw_dashed_vline(&mut area, to_x(center_s), panel.height)?;
            }

            imgproc::rectangle(&mut img, *panel, black(), 1, imgproc::LINE_8, 0)?;
            for tick in ticks.iter() {
                let x = panel.x + to_x(*tick);
                let bottom = panel.y + panel.height;
                imgproc::line(
                    &mut img,
                    Point::new(x, bottom),
                    Point::new(x, bottom + TICK_LENGTH),
                    black(),
                    1,
                    imgproc::LINE_8,
                    0,
                )?;
                // Shared time axis: only the bottom panel is labelled
                if idx + 1 == n_panels {
                    let label = elapsed_label(*tick);
                    let mut baseline = 0;
                    let label_size = imgproc::get_text_size(&label, FONT, FONT_SCALE, 1, &mut baseline)?;
                    draw_text(
                        &mut img,
                        &label,
                        Point::new(x - label_size.width / 2, bottom + TICK_LENGTH + 11),
                    )?;
                }
            }
        }
        Ok(img)
    }
}

fn draw_text(img: &mut impl opencv::core::ToInputOutputArray, text: &str, origin: Point) -> Result<(), PlotError> {
    imgproc::put_text(
        img,
        text,
        origin,
        FONT,
        FONT_SCALE,
        gray(),
        1,
        imgproc::LINE_AA,
        false,
    )?;
    Ok(())
}

fn draw_dashed_vline(img: &mut impl opencv::core::ToInputOutputArray, x: i32, height: i32) -> Result<(), PlotError> {
    let mut y = 0;
    while y < height {
        imgproc::line(
            img,
            Point::new(x, y),
            Point::new(x, (y + DASH_LENGTH).min(height)),
            black(),
            1,
            imgproc::LINE_8,
            0,
        )?;
        y += 2 * DASH_LENGTH;
    }
    Ok(())
}

/// Y axis limits covering every reading, padded by 5%
fn y_limits(values: &[f64]) -> (f64, f64) {
    let finite = values.iter().copied().filter(|v| v.is_finite());
    let (min, max) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !min.is_finite() {
        return (0.0, 1.0);
    }
    if max - min < f64::EPSILON {
        return (min - 1.0, max + 1.0);
    }
    let pad = 0.05 * (max - min);
    (min - pad, max + pad)
}

/// Round tick positions inside `[x_min, x_max]`, at most about six of them
fn x_ticks(x_min: f64, x_max: f64) -> Vec<f64> {
    let span = x_max - x_min;
    let step = TICK_STEPS_S
        .iter()
        .copied()
        .find(|step| span / step <= MAX_X_TICKS)
        .unwrap_or(span / MAX_X_TICKS);
    let mut ticks = Vec::new();
    let mut k = (x_min / step).ceil();
    while k * step <= x_max {
        ticks.push(k * step);
        k += 1.0;
    }
    ticks
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::Vec3b;
    use time::macros::datetime;
    use time::Duration;

    fn series(n_traces: usize) -> WeightSeries {
        let t0 = datetime!(2019-05-01 12:00:00 UTC);
        let timestamps: Vec<_> = (0..100).map(|i| t0 + Duration::milliseconds(100 * i)).collect();
        let traces = (0..n_traces)
            .map(|k| WeightTrace {
                title: format!("Shelf {}", n_traces - k),
                values: (0..100).map(|i| if i < 50 { 500.0 } else { 350.0 + k as f64 }).collect(),
            })
            .collect();
        WeightSeries::new(timestamps, traces).unwrap()
    }

    fn count_non_white(img: &Mat, rect: Rect) -> usize {
        let mut count = 0;
        for row in rect.y..rect.y + rect.height {
            for col in rect.x..rect.x + rect.width {
                let px = img.at_2d::<Vec3b>(row, col).unwrap();
                if px[0] != 255 || px[1] != 255 || px[2] != 255 {
                    count += 1;
                }
            }
        }
        count
    }

    #[test]
    fn test_render_size_and_content() {
        let plot = WeightPlot::new(&series(1), COMPACT_PLOT_SIZE).unwrap();
        let img = plot.render(5.0, 3.0).unwrap();
        assert_eq!(img.size().unwrap(), COMPACT_PLOT_SIZE);
        assert!(count_non_white(&img, plot.panels[0]) > 0);
    }

    #[test]
    fn test_render_outside_data_is_valid() {
        let plot = WeightPlot::new(&series(3), TALL_PLOT_SIZE).unwrap();
        for center in [-1000.0, 1e6] {
            let img = plot.render(center, 4.0).unwrap();
            assert_eq!(img.size().unwrap(), TALL_PLOT_SIZE);
        }
        // Degenerate window width is replaced rather than dividing by zero
        let img = plot.render(2.0, 0.0).unwrap();
        assert_eq!(img.size().unwrap(), TALL_PLOT_SIZE);
    }

    #[test]
    fn test_default_size() {
        assert_eq!(WeightPlot::default_size(&series(3), true), TALL_PLOT_SIZE);
        assert_eq!(WeightPlot::default_size(&series(1), true), COMPACT_PLOT_SIZE);
        assert_eq!(WeightPlot::default_size(&series(3), false), COMPACT_PLOT_SIZE);
    }

    #[test]
    fn test_y_limits() {
        assert_eq!(y_limits(&[]), (0.0, 1.0));
        assert_eq!(y_limits(&[5.0, 5.0]), (4.0, 6.0));
        let (lo, hi) = y_limits(&[0.0, 100.0]);
        assert!((lo + 5.0).abs() < 1e-9 && (hi - 105.0).abs() < 1e-9);
    }

    #[test]
    fn test_x_ticks() {
        assert_eq!(x_ticks(1.0, 9.0), vec![2.0, 4.0, 6.0, 8.0]);
        let ticks = x_ticks(-0.5, 0.5);
        assert_eq!(ticks.len(), 5);
        assert!((ticks[0] + 0.4).abs() < 1e-9);
        assert!(ticks[2].abs() < 1e-9);
    }
}
