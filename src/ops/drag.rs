//! Drag transform engine: pull a group of pixels off the canvas, move and
//! rotate it, then composite it back.

use std::collections::HashMap;

use crate::canvas::PixelCanvas;
use crate::color::{Color, TRANSPARENT};
use crate::history::Transaction;
use crate::selection::SelectionMask;

/// Subsampling grid per source pixel in anti-aliased mode; each sample
/// contributes `1/100` coverage weight.
const AA_GRID: u32 = 10;
/// Subsamples processed per cooperative step of an AA coverage job.
const AA_BATCH: usize = 1 << 17;

/// One extracted pixel: its color plus the four corner coordinates of its
/// unit quad (tl, tr, bl, br), tracked through every rotation.
#[derive(Clone, Copy, Debug)]
pub struct DragPixel {
    pub color: Color,
    pub corners: [[f32; 2]; 4],
}

impl DragPixel {
    fn at(x: u32, y: u32, color: Color) -> Self {
        let (xf, yf) = (x as f32, y as f32);
        Self {
            color,
            corners: [
                [xf, yf],
                [xf + 1.0, yf],
                [xf, yf + 1.0],
                [xf + 1.0, yf + 1.0],
            ],
        }
    }

    /// Top-left of the quad's bounding box. Rounding this to the nearest
    /// integer is the cheap non-anti-aliased placement: stable even when
    /// a quarter turn parks the quad exactly on pixel boundaries.
    fn origin(&self) -> (f32, f32) {
        let mut min = [f32::MAX, f32::MAX];
        for c in &self.corners {
            min[0] = min[0].min(c[0]);
            min[1] = min[1].min(c[1]);
        }
        (min[0], min[1])
    }
}

/// How pixels are selected for extraction.
#[derive(Clone, Copy, Debug)]
pub enum ExtractMode {
    /// 8-connected flood from the seed across non-transparent pixels,
    /// optionally bounded to the seed's exact color.
    Connected { same_color: bool },
    /// Every non-transparent pixel inside the selection mask, optionally
    /// filtered to one color.
    Masked { color_filter: Option<Color> },
}

/// A group of pixels detached from the canvas for dragging and rotating.
/// Created by [`extract`]; destroyed by [`DragGroup::commit`] (or simply
/// dropped to discard the move).
#[derive(Default)]
pub struct DragGroup {
    pub pixels: Vec<DragPixel>,
    /// Running translation in canvas space, applied at commit.
    pub offset: (f32, f32),
    coverage: Option<CoverageMap>,
}

/// Extract a pixel group. Extracted source pixels are cleared to
/// transparent and recorded into the transaction, so the extraction
/// itself is undoable.
pub fn extract(
    canvas: &mut PixelCanvas,
    mask: &SelectionMask,
    tx: &mut Transaction,
    seed: (u32, u32),
    mode: ExtractMode,
) -> DragGroup {
    let indices = match mode {
        ExtractMode::Connected { same_color } => connected_indices(canvas, seed, same_color),
        ExtractMode::Masked { color_filter } => masked_indices(canvas, mask, color_filter),
    };

    let w = canvas.width() as usize;
    let mut group = DragGroup::default();
    for idx in indices {
        let color = canvas.get_index(idx);
        tx.record(idx, color);
        canvas.set_index(idx, TRANSPARENT);
        group
            .pixels
            .push(DragPixel::at((idx % w) as u32, (idx / w) as u32, color));
    }
    group
}

/// 8-connected flood over non-transparent pixels starting at the seed.
fn connected_indices(canvas: &PixelCanvas, seed: (u32, u32), same_color: bool) -> Vec<usize> {
    let Some(seed_idx) = canvas.index(seed.0, seed.1) else {
        return Vec::new();
    };
    let seed_color = canvas.get_index(seed_idx);
    if seed_color.is_transparent() {
        return Vec::new();
    }

    let w = canvas.width() as i64;
    let h = canvas.height() as i64;
    let mut visited = vec![false; canvas.len()];
    let mut stack = vec![seed_idx];
    let mut out = Vec::new();
    visited[seed_idx] = true;

    while let Some(idx) = stack.pop() {
        out.push(idx);
        let x = (idx % w as usize) as i64;
        let y = (idx / w as usize) as i64;
        for dy in -1i64..=1 {
            for dx in -1i64..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= w || ny >= h {
                    continue;
                }
                let ni = (ny * w + nx) as usize;
                if visited[ni] {
                    continue;
                }
                visited[ni] = true;
                let c = canvas.get_index(ni);
                if c.is_transparent() {
                    continue;
                }
                if same_color && c != seed_color {
                    continue;
                }
                stack.push(ni);
            }
        }
    }
    out.sort_unstable();
    out
}

fn masked_indices(
    canvas: &PixelCanvas,
    mask: &SelectionMask,
    color_filter: Option<Color>,
) -> Vec<usize> {
    (0..canvas.len())
        .filter(|&idx| {
            if !mask.allows_index(idx) {
                return false;
            }
            let c = canvas.get_index(idx);
            !c.is_transparent() && color_filter.is_none_or(|f| c == f)
        })
        .collect()
}

impl DragGroup {
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Move the group by a screen-space pointer delta. `scale` is the
    /// screen-pixels-per-canvas-pixel ratio of the view.
    pub fn drag(&mut self, screen_dx: f32, screen_dy: f32, scale: f32) {
        let scale = if scale > 0.0 { scale } else { 1.0 };
        self.offset.0 += screen_dx / scale;
        self.offset.1 += screen_dy / scale;
    }

    /// Bounding-box center of the group in canvas space, the default
    /// rotation pivot.
    pub fn pivot(&self) -> (f32, f32) {
        if self.pixels.is_empty() {
            return (0.0, 0.0);
        }
        let mut min = [f32::MAX, f32::MAX];
        let mut max = [f32::MIN, f32::MIN];
        for p in &self.pixels {
            for c in &p.corners {
                min[0] = min[0].min(c[0]);
                min[1] = min[1].min(c[1]);
                max[0] = max[0].max(c[0]);
                max[1] = max[1].max(c[1]);
            }
        }
        ((min[0] + max[0]) * 0.5, (min[1] + max[1]) * 0.5)
    }

    /// Rotate every pixel quad by `theta` radians around `pivot`:
    /// translate-to-pivot, rotate, translate-back composed into one
    /// matrix applied to all corners. Any previously computed AA coverage
    /// is stale afterwards and gets dropped.
    pub fn rotate(&mut self, theta: f32, pivot: (f32, f32)) {
        let m = mat_mul(
            mat_mul(translation(pivot.0, pivot.1), rotation(theta)),
            translation(-pivot.0, -pivot.1),
        );
        for p in &mut self.pixels {
            for corner in &mut p.corners {
                let (x, y) = apply(&m, corner[0], corner[1]);
                corner[0] = x;
                corner[1] = y;
            }
        }
        self.coverage = None;
    }

    /// Start computing anti-aliased coverage for the group's current
    /// geometry. Drive the returned job from the frame tick; it yields
    /// after every [`AA_BATCH`] subsamples so large groups never stall
    /// the render loop.
    pub fn begin_coverage(&self) -> CoverageJob {
        CoverageJob::new(self.pixels.clone())
    }

    /// Attach a finished coverage job's result for the next commit.
    pub fn set_coverage(&mut self, coverage: CoverageMap) {
        self.coverage = Some(coverage);
    }

    pub fn has_coverage(&self) -> bool {
        self.coverage.is_some()
    }

    /// Composite the group back onto the canvas and reset it to empty.
    ///
    /// Each destination pixel inside the buffer and permitted by the mask
    /// (or by `override_mask`) is alpha-blended, or replaced when `blend`
    /// is off, with its prior value recorded. With AA coverage attached
    /// the coverage map is walked instead of the raw quads, producing the
    /// soft partial-coverage edges. Returns the number of pixels written.
    pub fn commit(
        &mut self,
        canvas: &mut PixelCanvas,
        mask: &SelectionMask,
        tx: &mut Transaction,
        blend: bool,
        override_mask: bool,
    ) -> usize {
        let (ox, oy) = (self.offset.0.round() as i32, self.offset.1.round() as i32);
        let mut written = 0usize;

        let mut write = |canvas: &mut PixelCanvas, x: i32, y: i32, color: Color| {
            if color.is_transparent() || !canvas.contains(x, y) {
                return;
            }
            let idx = canvas.index(x as u32, y as u32).expect("bounds checked");
            if !override_mask && !mask.allows_index(idx) {
                return;
            }
            let prev = canvas.get_index(idx);
            let out = if blend { color.blend_over(prev) } else { color };
            if out == prev {
                return;
            }
            tx.record(idx, prev);
            canvas.set_index(idx, out);
            written += 1;
        };

        if let Some(coverage) = self.coverage.take() {
            let mut cells: Vec<((i32, i32), Accum)> = coverage.cells.into_iter().collect();
            // Stable write order regardless of hash iteration.
            cells.sort_unstable_by_key(|&((x, y), _)| (y, x));
            for ((x, y), acc) in cells {
                write(canvas, x + ox, y + oy, acc.resolve());
            }
        } else {
            for p in &self.pixels {
                let (qx, qy) = p.origin();
                write(
                    canvas,
                    round_snapped(qx + self.offset.0),
                    round_snapped(qy + self.offset.1),
                    p.color,
                );
            }
        }

        self.pixels.clear();
        self.offset = (0.0, 0.0);
        written
    }
}

// ============================================================================
// 3x3 AFFINE MATRICES
// ============================================================================

type Mat3 = [[f32; 3]; 3];

fn translation(tx: f32, ty: f32) -> Mat3 {
    [[1.0, 0.0, tx], [0.0, 1.0, ty], [0.0, 0.0, 1.0]]
}

fn rotation(theta: f32) -> Mat3 {
    let (s, c) = theta.sin_cos();
    [[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]]
}

fn mat_mul(a: Mat3, b: Mat3) -> Mat3 {
    let mut out = [[0.0f32; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = a[i][0] * b[0][j] + a[i][1] * b[1][j] + a[i][2] * b[2][j];
        }
    }
    out
}

#[inline]
fn apply(m: &Mat3, x: f32, y: f32) -> (f32, f32) {
    (
        m[0][0] * x + m[0][1] * y + m[0][2],
        m[1][0] * x + m[1][1] * y + m[1][2],
    )
}

// ============================================================================
// ANTI-ALIASED COVERAGE
// ============================================================================

#[derive(Clone, Copy, Default)]
struct Accum {
    r: f32,
    g: f32,
    b: f32,
    a: f32,
    weight: f32,
}

impl Accum {
    fn add(&mut self, color: Color, w: f32) {
        // Total coverage is capped at 1 per destination pixel; overlap
        // beyond full coverage adds nothing.
        let w = w.min(1.0 - self.weight);
        if w <= 0.0 {
            return;
        }
        self.r += color.r() as f32 * w;
        self.g += color.g() as f32 * w;
        self.b += color.b() as f32 * w;
        self.a += color.a() as f32 * w;
        self.weight += w;
    }

    fn resolve(self) -> Color {
        if self.weight <= 0.0 {
            return TRANSPARENT;
        }
        let inv = 1.0 / self.weight;
        Color::new(
            (self.r * inv).round() as u8,
            (self.g * inv).round() as u8,
            (self.b * inv).round() as u8,
            (self.a * self.weight.min(1.0) * inv).round() as u8,
        )
    }
}

/// Destination-keyed accumulation of subsample coverage.
pub struct CoverageMap {
    cells: HashMap<(i32, i32), Accum>,
}

/// Resumable coverage computation over a snapshot of the group geometry.
/// Each source quad is sampled on a 10x10 grid; every sample deposits
/// 1/100 weight at the destination pixel under it.
pub struct CoverageJob {
    pixels: Vec<DragPixel>,
    pixel_idx: usize,
    sub_idx: u32,
    cells: HashMap<(i32, i32), Accum>,
}

impl CoverageJob {
    fn new(pixels: Vec<DragPixel>) -> Self {
        Self {
            pixels,
            pixel_idx: 0,
            sub_idx: 0,
            cells: HashMap::new(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.pixel_idx >= self.pixels.len()
    }

    /// Process one cooperative batch. Returns `true` when the whole group
    /// has been sampled.
    pub fn step(&mut self) -> bool {
        self.step_budget(AA_BATCH)
    }

    pub fn step_budget(&mut self, budget: usize) -> bool {
        let per_pixel = AA_GRID * AA_GRID;
        let weight = 1.0 / per_pixel as f32;
        let mut remaining = budget;

        while remaining > 0 && self.pixel_idx < self.pixels.len() {
            let p = self.pixels[self.pixel_idx];
            while remaining > 0 && self.sub_idx < per_pixel {
                let sy = self.sub_idx / AA_GRID;
                let sx = self.sub_idx % AA_GRID;
                // Bilinear interpolation across the quad corners puts the
                // sample correctly even after rotation skews the quad.
                let u = (sx as f32 + 0.5) / AA_GRID as f32;
                let v = (sy as f32 + 0.5) / AA_GRID as f32;
                let top = lerp2(p.corners[0], p.corners[1], u);
                let bottom = lerp2(p.corners[2], p.corners[3], u);
                let sample = lerp2(top, bottom, v);

                let key = (sample[0].floor() as i32, sample[1].floor() as i32);
                self.cells.entry(key).or_default().add(p.color, weight);

                self.sub_idx += 1;
                remaining -= 1;
            }
            if self.sub_idx == per_pixel {
                self.sub_idx = 0;
                self.pixel_idx += 1;
            }
        }
        self.is_done()
    }

    /// Finished map, ready for [`DragGroup::set_coverage`].
    pub fn finish(self) -> CoverageMap {
        debug_assert!(self.is_done());
        CoverageMap { cells: self.cells }
    }
}

#[inline]
fn lerp2(a: [f32; 2], b: [f32; 2], t: f32) -> [f32; 2] {
    [a[0] + (b[0] - a[0]) * t, a[1] + (b[1] - a[1]) * t]
}

/// Round to the nearest integer after snapping to a 1/1024 grid, so the
/// ulp-sized noise that rotation leaves on exact half-pixel coordinates
/// cannot flip the result.
#[inline]
fn round_snapped(v: f32) -> i32 {
    ((v * 1024.0).round() / 1024.0).round() as i32
}
