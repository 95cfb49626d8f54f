//! Shape rasterization: lines, rectangles and ellipses, all funneled
//! through one per-point draw dispatch.

use crate::canvas::PixelCanvas;
use crate::color::Color;
use crate::history::Transaction;
use crate::selection::SelectionMask;

use super::brush::{BrushEngine, BrushTip};

/// How each rasterized point is painted. A closed set dispatched by tag
/// inside the rasterizers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StrokeBrush {
    Stamp { tip: BrushTip },
    PixelPerfect,
    Spray { tip: BrushTip, density: f32 },
}

/// Paint one point of a stroke with the selected brush strategy.
#[allow(clippy::too_many_arguments)]
pub fn draw_point(
    engine: &mut BrushEngine,
    canvas: &mut PixelCanvas,
    mask: &SelectionMask,
    tx: &mut Transaction,
    x: i32,
    y: i32,
    size: u32,
    color: Color,
    brush: StrokeBrush,
) {
    match brush {
        StrokeBrush::Stamp { tip } => engine.stamp(canvas, mask, tx, x, y, size, tip, color),
        StrokeBrush::PixelPerfect => engine.pixel_perfect(canvas, mask, tx, x, y, size, color),
        StrokeBrush::Spray { tip, density } => {
            engine.spray(canvas, mask, tx, x, y, size, tip, color, density)
        }
    }
}

/// Rasterize a line by walking the dominant axis and accumulating the
/// fractional minor-axis error. Thick strokes stride the dominant axis by
/// `size/2` so successive stamps do not pile on top of each other; the
/// endpoint is always painted.
#[allow(clippy::too_many_arguments)]
pub fn draw_line(
    engine: &mut BrushEngine,
    canvas: &mut PixelCanvas,
    mask: &SelectionMask,
    tx: &mut Transaction,
    from: (i32, i32),
    to: (i32, i32),
    size: u32,
    color: Color,
    brush: StrokeBrush,
) {
    let (x0, y0) = from;
    let (x1, y1) = to;
    draw_point(engine, canvas, mask, tx, x0, y0, size, color, brush);
    if from == to {
        return;
    }

    let dx = x1 - x0;
    let dy = y1 - y0;
    let stride = (size as i32 / 2).max(1);

    let (major_len, minor_len) = (dx.abs().max(dy.abs()), dx.abs().min(dy.abs()));
    let slope = minor_len as f32 / major_len as f32;
    let x_major = dx.abs() >= dy.abs();
    let (major_sign, minor_sign) = if x_major {
        (dx.signum(), dy.signum())
    } else {
        (dy.signum(), dx.signum())
    };

    let mut travelled = 0i32;
    let mut minor = 0i32;
    let mut err = 0f32;
    while travelled < major_len {
        let advance = stride.min(major_len - travelled);
        travelled += advance;
        err += slope * advance as f32;
        while err >= 0.5 {
            minor += minor_sign;
            err -= 1.0;
        }
        let (x, y) = if x_major {
            (x0 + major_sign * travelled, y0 + minor)
        } else {
            (x0 + minor, y0 + major_sign * travelled)
        };
        draw_point(engine, canvas, mask, tx, x, y, size, color, brush);
    }

    // Rounding residue can leave the walk one minor step short.
    let (fx, fy) = if x_major {
        (x1, y0 + minor)
    } else {
        (x0 + minor, y1)
    };
    if (fx, fy) != (x1, y1) {
        draw_point(engine, canvas, mask, tx, x1, y1, size, color, brush);
    }
}

/// Rectangle outline: four lines between the corner pairs.
#[allow(clippy::too_many_arguments)]
pub fn draw_rect(
    engine: &mut BrushEngine,
    canvas: &mut PixelCanvas,
    mask: &SelectionMask,
    tx: &mut Transaction,
    corner_a: (i32, i32),
    corner_b: (i32, i32),
    size: u32,
    color: Color,
    brush: StrokeBrush,
) {
    let (x0, y0) = corner_a;
    let (x1, y1) = corner_b;
    draw_line(engine, canvas, mask, tx, (x0, y0), (x1, y0), size, color, brush);
    draw_line(engine, canvas, mask, tx, (x1, y0), (x1, y1), size, color, brush);
    draw_line(engine, canvas, mask, tx, (x1, y1), (x0, y1), size, color, brush);
    draw_line(engine, canvas, mask, tx, (x0, y1), (x0, y0), size, color, brush);
}

/// Angular increment for ellipse sampling. Small enough that consecutive
/// samples are at most a few pixels apart on any reasonable canvas; the
/// line rasterizer closes the remaining gaps.
const ELLIPSE_STEP: f32 = 0.05;

/// Ellipse outline via parametric sampling, consecutive samples joined by
/// the line rasterizer.
#[allow(clippy::too_many_arguments)]
pub fn draw_ellipse(
    engine: &mut BrushEngine,
    canvas: &mut PixelCanvas,
    mask: &SelectionMask,
    tx: &mut Transaction,
    center: (f32, f32),
    radii: (f32, f32),
    size: u32,
    color: Color,
    brush: StrokeBrush,
) {
    let (h, k) = center;
    let (a, b) = radii;
    let start = (
        (h + a).round() as i32,
        k.round() as i32,
    );
    let mut prev = start;
    let mut theta = ELLIPSE_STEP;
    while theta < std::f32::consts::TAU {
        let point = (
            (h + a * theta.cos()).round() as i32,
            (k + b * theta.sin()).round() as i32,
        );
        if point != prev {
            draw_line(engine, canvas, mask, tx, prev, point, size, color, brush);
            prev = point;
        }
        theta += ELLIPSE_STEP;
    }
    draw_line(engine, canvas, mask, tx, prev, start, size, color, brush);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn white() -> Color {
        Color::opaque(255, 255, 255)
    }

    fn setup(w: u32, h: u32) -> (BrushEngine, PixelCanvas, SelectionMask) {
        (
            BrushEngine::with_seed(20, 1),
            PixelCanvas::new(w, h),
            SelectionMask::new(w, h),
        )
    }

    fn painted(canvas: &PixelCanvas) -> Vec<(i32, i32)> {
        let mut out = Vec::new();
        for y in 0..canvas.height() {
            for x in 0..canvas.width() {
                if canvas.get_pixel(x, y) != crate::color::TRANSPARENT {
                    out.push((x as i32, y as i32));
                }
            }
        }
        out
    }

    const STAMP: StrokeBrush = StrokeBrush::Stamp { tip: BrushTip::Square };

    #[test]
    fn horizontal_line_is_a_solid_run() {
        let (mut engine, mut canvas, mask) = setup(16, 16);
        let mut tx = Transaction::new();
        draw_line(&mut engine, &mut canvas, &mask, &mut tx, (2, 5), (9, 5), 1, white(), STAMP);
        let expected: Vec<(i32, i32)> = (2..=9).map(|x| (x, 5)).collect();
        assert_eq!(painted(&canvas), expected);
    }

    #[test]
    fn perfect_diagonal_steps_both_axes() {
        let (mut engine, mut canvas, mask) = setup(16, 16);
        let mut tx = Transaction::new();
        draw_line(&mut engine, &mut canvas, &mask, &mut tx, (0, 0), (5, 5), 1, white(), STAMP);
        let hit = painted(&canvas);
        assert!(hit.contains(&(0, 0)));
        assert!(hit.contains(&(5, 5)));
        // Each column holds exactly one pixel on a 1:1 diagonal.
        for x in 0..=5 {
            assert_eq!(hit.iter().filter(|p| p.0 == x).count(), 1, "column {x}");
        }
    }

    #[test]
    fn steep_line_walks_the_y_axis() {
        let (mut engine, mut canvas, mask) = setup(16, 16);
        let mut tx = Transaction::new();
        draw_line(&mut engine, &mut canvas, &mask, &mut tx, (3, 1), (5, 9), 1, white(), STAMP);
        let hit = painted(&canvas);
        assert!(hit.contains(&(3, 1)));
        assert!(hit.contains(&(5, 9)));
        // y-dominant: every row between the endpoints is touched.
        for y in 1..=9 {
            assert!(hit.iter().any(|p| p.1 == y), "row {y} skipped");
        }
    }

    #[test]
    fn reversed_endpoints_cover_the_same_cells() {
        let (mut engine, mut canvas, mask) = setup(16, 16);
        let mut tx = Transaction::new();
        draw_line(&mut engine, &mut canvas, &mask, &mut tx, (1, 2), (10, 6), 1, white(), STAMP);
        let forward = painted(&canvas);

        let (mut engine2, mut canvas2, mask2) = setup(16, 16);
        let mut tx2 = Transaction::new();
        draw_line(&mut engine2, &mut canvas2, &mask2, &mut tx2, (10, 6), (1, 2), 1, white(), STAMP);
        let backward = painted(&canvas2);

        assert!(forward.contains(&(1, 2)) && forward.contains(&(10, 6)));
        assert!(backward.contains(&(1, 2)) && backward.contains(&(10, 6)));
        assert_eq!(forward.len(), backward.len());
    }

    #[test]
    fn thick_line_strides_but_stays_connected_and_hits_ends() {
        let (mut engine, mut canvas, mask) = setup(32, 32);
        let mut tx = Transaction::new();
        draw_line(&mut engine, &mut canvas, &mask, &mut tx, (2, 2), (25, 9), 6, white(), STAMP);
        // Both endpoint stamps landed.
        assert!(canvas.get_pixel(2, 2) == white());
        assert!(canvas.get_pixel(25, 9) == white());
        // A 6-wide stroke leaves no 1-px pinholes along its spine.
        let hit = painted(&canvas);
        for x in 2..=25 {
            assert!(hit.iter().any(|p| p.0 == x), "column {x} empty");
        }
    }

    #[test]
    fn rect_outline_walks_all_four_edges() {
        let (mut engine, mut canvas, mask) = setup(16, 16);
        let mut tx = Transaction::new();
        draw_rect(&mut engine, &mut canvas, &mask, &mut tx, (2, 3), (10, 8), 1, white(), STAMP);
        for x in 2..=10 {
            assert_eq!(canvas.get_pixel(x, 3), white(), "top edge {x}");
            assert_eq!(canvas.get_pixel(x, 8), white(), "bottom edge {x}");
        }
        for y in 3..=8 {
            assert_eq!(canvas.get_pixel(2, y as u32), white(), "left edge {y}");
            assert_eq!(canvas.get_pixel(10, y as u32), white(), "right edge {y}");
        }
        // Interior untouched.
        assert_eq!(canvas.get_pixel(5, 5), crate::color::TRANSPARENT);
    }

    #[test]
    fn ellipse_hits_its_extremes_and_stays_in_bounds() {
        let (mut engine, mut canvas, mask) = setup(32, 32);
        let mut tx = Transaction::new();
        draw_ellipse(
            &mut engine, &mut canvas, &mask, &mut tx,
            (15.0, 15.0), (10.0, 6.0), 1, white(), STAMP,
        );
        assert_eq!(canvas.get_pixel(25, 15), white());
        assert_eq!(canvas.get_pixel(5, 15), white());
        assert_eq!(canvas.get_pixel(15, 21), white());
        assert_eq!(canvas.get_pixel(15, 9), white());
        for (x, y) in painted(&canvas) {
            assert!((5..=25).contains(&x) && (9..=21).contains(&y), "({x},{y}) outside");
        }
        assert_eq!(canvas.get_pixel(15, 15), crate::color::TRANSPARENT);
    }

    #[test]
    fn line_records_ledger_diffs_through_the_brush() {
        let (mut engine, mut canvas, mask) = setup(16, 16);
        let mut tx = Transaction::new();
        draw_line(&mut engine, &mut canvas, &mask, &mut tx, (0, 0), (7, 0), 1, white(), STAMP);
        assert_eq!(tx.len(), 8);
    }
}
