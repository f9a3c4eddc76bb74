//! Alert chart rendering.
//!
//! The alert carries a small dark-background price line with no axes or
//! labels, meant to be glanced at inside a chat message. Rendered to an
//! in-memory RGB buffer with plotters and encoded as PNG so chat clients
//! show it inline.

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use plotters::prelude::*;

use crate::types::{Chart, PriceSeries, RenderError};

pub trait ChartRenderer: Send + Sync {
    fn render(&self, series: &PriceSeries) -> Result<Chart, RenderError>;
}

/// PNG sparkline renderer.
pub struct SparklineRenderer {
    width: u32,
    height: u32,
    background: RGBColor,
    stroke: RGBColor,
}

impl Default for SparklineRenderer {
    fn default() -> Self {
        Self {
            width: 500,
            height: 250,
            background: RGBColor(0, 0, 0),
            stroke: RGBColor(0, 255, 204),
        }
    }
}

impl SparklineRenderer {
    fn draw(&self, closes: &[f64], pixels: &mut [u8]) -> Result<(), Box<dyn std::error::Error>> {
        let root = BitMapBackend::with_buffer(pixels, (self.width, self.height)).into_drawing_area();
        root.fill(&self.background)?;

        let (lo, hi) = y_bounds(closes);
        let last = closes.len() - 1;
        let mut chart = ChartBuilder::on(&root)
            .margin(8)
            .build_cartesian_2d(0f64..last as f64, lo..hi)?;

        chart.draw_series(LineSeries::new(
            closes.iter().enumerate().map(|(i, &c)| (i as f64, c)),
            self.stroke.stroke_width(2),
        ))?;
        // Live price marker.
        chart.draw_series(std::iter::once(Circle::new(
            (last as f64, closes[last]),
            4,
            self.stroke.filled(),
        )))?;

        root.present()?;
        Ok(())
    }
}

/// Vertical range with 5% headroom; flat series get a unit band.
fn y_bounds(closes: &[f64]) -> (f64, f64) {
    let min = closes.iter().copied().fold(f64::INFINITY, f64::min);
    let max = closes.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max > min {
        let pad = (max - min) * 0.05;
        (min - pad, max + pad)
    } else {
        (min - 1.0, max + 1.0)
    }
}

impl ChartRenderer for SparklineRenderer {
    fn render(&self, series: &PriceSeries) -> Result<Chart, RenderError> {
        let closes = series.closes();
        if closes.len() < 2 {
            return Err(RenderError(format!(
                "{}: need at least 2 points, got {}",
                series.ticker,
                closes.len()
            )));
        }
        if closes.iter().any(|c| !c.is_finite()) {
            return Err(RenderError(format!("{}: non-finite close", series.ticker)));
        }

        let mut pixels = vec![0u8; self.width as usize * self.height as usize * 3];
        self.draw(&closes, &mut pixels)
            .map_err(|e| RenderError(format!("{}: {e}", series.ticker)))?;

        let mut bytes = Vec::new();
        PngEncoder::new(&mut bytes)
            .write_image(&pixels, self.width, self.height, ExtendedColorType::Rgb8)
            .map_err(|e| RenderError(format!("{}: png encode: {e}", series.ticker)))?;

        Ok(Chart {
            bytes,
            mime_type: "image/png",
            file_name: "chart.png",
        })
    }
}
