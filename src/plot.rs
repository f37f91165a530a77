//! `plotters` による PNG 出力（メッシュと散布図による場の可視化）。

use crate::geometry::{BoundaryPoints, Mesh};
use nalgebra::Point2;
use plotters::prelude::*;
use std::ops::Range;
use std::path::Path;

type PlotResult = Result<(), Box<dyn std::error::Error>>;

/// 値を青（最小）から赤（最大）への色相に対応させます。
pub fn color_scale(value: f64, min: f64, max: f64) -> HSLColor {
    let t = if max > min { ((value - min) / (max - min)).clamp(0.0, 1.0) } else { 0.5 };
    HSLColor((1.0 - t) * 240.0 / 360.0, 0.9, 0.5)
}

fn padded_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if lo > hi {
        return -1.0..1.0;
    }
    let pad = 0.05 * (hi - lo).max(1e-12);
    (lo - pad)..(hi + pad)
}

/// セルの輪郭と、境界IDごとに色分けした境界点を描画します。
pub fn plot_mesh(mesh: &Mesh, boundary_points: &BoundaryPoints, path: &Path) -> PlotResult {
    let root = BitMapBackend::new(path, (800, 800)).into_drawing_area();
    root.fill(&WHITE)?;
    let x_range = padded_range(mesh.vertices().iter().map(|p| p.x));
    let y_range = padded_range(mesh.vertices().iter().map(|p| p.y));
    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("Mesh ({} cells)", mesh.connectivity().len()),
            ("sans-serif", 30).into_font(),
        )
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(x_range, y_range)?;
    chart.configure_mesh().x_desc("x").y_desc("y").draw()?;

    chart.draw_series(mesh.cells().into_iter().map(|cell| {
        let mut outline: Vec<(f64, f64)> = cell.iter().map(|p| (p.x, p.y)).collect();
        outline.push(outline[0]);
        PathElement::new(outline, BLACK.stroke_width(1))
    }))?;

    for (i, (id, points)) in boundary_points.iter().enumerate() {
        let color = Palette99::pick(i).to_rgba();
        chart
            .draw_series(
                points
                    .iter()
                    .map(|p| Circle::new((p.x, p.y), 3, color.filled())),
            )?
            .label(format!("boundary {id}"))
            .legend(move |(x, y)| Circle::new((x + 10, y), 4, color.filled()));
    }
    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;
    root.present()?;
    Ok(())
}

/// 点列上のスカラー値を色付きの散布図として描画します。
pub fn plot_field(points: &[Point2<f64>], values: &[f64], title: &str, path: &Path) -> PlotResult {
    if points.len() != values.len() {
        return Err(format!("{} points but {} values", points.len(), values.len()).into());
    }
    let root = BitMapBackend::new(path, (800, 700)).into_drawing_area();
    root.fill(&WHITE)?;
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("{title} [{min:.3e}, {max:.3e}]"),
            ("sans-serif", 30).into_font(),
        )
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(
            padded_range(points.iter().map(|p| p.x)),
            padded_range(points.iter().map(|p| p.y)),
        )?;
    chart.configure_mesh().x_desc("x").y_desc("y").draw()?;
    chart.draw_series(
        points
            .iter()
            .zip(values)
            .map(|(p, &v)| Circle::new((p.x, p.y), 2, color_scale(v, min, max).filled())),
    )?;
    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_scale_runs_from_blue_to_red() {
        let HSLColor(low, _, _) = color_scale(-1.0, -1.0, 3.0);
        let HSLColor(high, _, _) = color_scale(3.0, -1.0, 3.0);
        let HSLColor(mid, _, _) = color_scale(1.0, -1.0, 3.0);
        assert!((low - 2.0 / 3.0).abs() < 1e-12);
        assert!(high.abs() < 1e-12);
        assert!((mid - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn constant_field_uses_the_middle_color() {
        let HSLColor(hue, _, _) = color_scale(0.4, 0.4, 0.4);
        assert!((hue - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn padded_range_of_nothing_is_the_unit_interval() {
        assert_eq!(padded_range(std::iter::empty()), -1.0..1.0);
        let range = padded_range([0.0, 2.0].into_iter());
        assert!(range.start < 0.0 && range.end > 2.0);
    }
}
