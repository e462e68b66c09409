//! Performance charts embedded in the HTML report
//!
//! A 2x2 SVG grid: average synthesis time per service, average time per
//! test case, success rate per service, and text length against synthesis
//! time for every successful request.

use std::fmt::Display;

use plotters::coord::Shift;
use plotters::prelude::*;

use crate::error::{HarnessError, Result};
use crate::report::{ComparisonReport, ServiceEntry};

const CHART_SIZE: (u32, u32) = (1200, 900);

type Panel<'a> = DrawingArea<SVGBackend<'a>, Shift>;

fn chart_error<E: Display>(e: E) -> HarnessError {
    HarnessError::Chart {
        reason: e.to_string(),
    }
}

/// Render the chart grid as an SVG document
///
/// Returns `None` when no request succeeded with a measured time, since
/// every panel would be empty.
pub fn render_charts(report: &ComparisonReport) -> Result<Option<String>> {
    let services = match &report.summary {
        Some(summary) => summary.services.clone(),
        None => report.services.iter().map(ServiceEntry::summary).collect(),
    };
    let test_types = match &report.summary {
        Some(summary) => summary.by_test_type.clone(),
        None => report.test_type_summaries(),
    };

    let service_times: Vec<(String, f64)> = services
        .iter()
        .filter_map(|s| s.avg_synthesis_time.map(|t| (s.name.clone(), t)))
        .collect();
    if service_times.is_empty() {
        return Ok(None);
    }

    let test_times: Vec<(String, f64)> = test_types
        .iter()
        .filter_map(|t| t.avg_synthesis_time.map(|v| (t.test_id.clone(), v)))
        .collect();
    let success_rates: Vec<(String, f64)> = services.iter().map(|s| (s.name.clone(), s.success_rate)).collect();

    let scatter: Vec<(String, Vec<(f64, f64)>)> = report
        .completed()
        .map(|entry| {
            let points = entry
                .results
                .iter()
                .filter(|r| r.success)
                .filter_map(|r| r.synthesis_time.map(|t| (r.text_length as f64, t)))
                .collect();
            (entry.name.clone(), points)
        })
        .collect();

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, CHART_SIZE).into_drawing_area();
        root.fill(&WHITE).map_err(chart_error)?;
        let panels = root.split_evenly((2, 2));

        draw_bars(&panels[0], "Average synthesis time by service", "seconds", &service_times, None)?;
        draw_bars(&panels[1], "Average synthesis time by test", "seconds", &test_times, None)?;
        draw_bars(&panels[2], "Success rate by service", "%", &success_rates, Some(100.0))?;
        draw_scatter(&panels[3], &scatter)?;

        root.present().map_err(chart_error)?;
    }

    Ok(Some(svg))
}

fn draw_bars(panel: &Panel<'_>, caption: &str, y_desc: &str, bars: &[(String, f64)], y_max: Option<f64>) -> Result<()> {
    let top = y_max.unwrap_or_else(|| upper_bound(bars.iter().map(|(_, v)| *v)));

    let mut chart = ChartBuilder::on(panel)
        .caption(caption, ("sans-serif", 20).into_font())
        .margin(15)
        .x_label_area_size(35)
        .y_label_area_size(55)
        .build_cartesian_2d((0..bars.len() as i32).into_segmented(), 0f64..top)
        .map_err(chart_error)?;

    let label = |v: &SegmentValue<i32>| match v {
        SegmentValue::CenterOf(i) | SegmentValue::Exact(i) => bars
            .get(*i as usize)
            .map(|(name, _)| name.clone())
            .unwrap_or_default(),
        SegmentValue::Last => String::new(),
    };

    chart
        .configure_mesh()
        .disable_x_mesh()
        .y_desc(y_desc)
        .x_label_formatter(&label)
        .draw()
        .map_err(chart_error)?;

    chart
        .draw_series(bars.iter().enumerate().map(|(i, (_, value))| {
            let x = i as i32;
            let mut bar = Rectangle::new(
                [(SegmentValue::Exact(x), 0.0), (SegmentValue::Exact(x + 1), *value)],
                Palette99::pick(i).to_rgba().filled(),
            );
            bar.set_margin(0, 0, 10, 10);
            bar
        }))
        .map_err(chart_error)?;

    Ok(())
}

fn draw_scatter(panel: &Panel<'_>, series: &[(String, Vec<(f64, f64)>)]) -> Result<()> {
    let all = || series.iter().flat_map(|(_, points)| points.iter());
    let x_max = upper_bound(all().map(|(x, _)| *x));
    let y_max = upper_bound(all().map(|(_, y)| *y));

    let mut chart = ChartBuilder::on(panel)
        .caption("Text length vs synthesis time", ("sans-serif", 20).into_font())
        .margin(15)
        .x_label_area_size(35)
        .y_label_area_size(55)
        .build_cartesian_2d(0f64..x_max, 0f64..y_max)
        .map_err(chart_error)?;

    chart
        .configure_mesh()
        .x_desc("characters")
        .y_desc("seconds")
        .draw()
        .map_err(chart_error)?;

    for (i, (name, points)) in series.iter().enumerate().filter(|(_, (_, p))| !p.is_empty()) {
        let color = Palette99::pick(i).to_rgba();
        chart
            .draw_series(points.iter().map(|&point| Circle::new(point, 4, color.filled())))
            .map_err(chart_error)?
            .label(name.as_str())
            .legend(move |(x, y)| Circle::new((x, y), 4, color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()
        .map_err(chart_error)?;

    Ok(())
}

/// Axis ceiling with some headroom; never an empty range
fn upper_bound(values: impl Iterator<Item = f64>) -> f64 {
    let max = values.filter(|v| v.is_finite()).fold(0.0, f64::max);
    if max > 0.0 {
        max * 1.15
    } else {
        1.0
    }
}
