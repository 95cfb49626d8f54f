//! Brush stamping: plain stamps, the spray variant, and the
//! pixel-perfect rolling buffer.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::canvas::PixelCanvas;
use crate::color::Color;
use crate::history::Transaction;
use crate::selection::SelectionMask;

/// Stamp footprint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BrushTip {
    #[default]
    Square,
    Round,
}

/// Stateful brush machinery shared by all stroke tools: the spray RNG and
/// the pixel-perfect buffer live here so a stroke can span many pointer
/// events.
pub struct BrushEngine {
    rng: SmallRng,
    pixel_perfect: PixelPerfectBuffer,
}

impl BrushEngine {
    pub fn new(pixel_perfect_len: usize) -> Self {
        Self {
            rng: SmallRng::from_os_rng(),
            pixel_perfect: PixelPerfectBuffer::new(pixel_perfect_len),
        }
    }

    /// Deterministic spray for tests.
    pub fn with_seed(pixel_perfect_len: usize, seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            pixel_perfect: PixelPerfectBuffer::new(pixel_perfect_len),
        }
    }

    /// Stamp a `size`x`size` kernel centered on `(cx, cy)`. Round tips
    /// reject kernel cells farther than `size/2` from the half-pixel-
    /// offset kernel center. Cells outside the canvas or the selection
    /// mask are skipped silently; cells already holding the draw color
    /// are neither recorded nor rewritten.
    pub fn stamp(
        &mut self,
        canvas: &mut PixelCanvas,
        mask: &SelectionMask,
        tx: &mut Transaction,
        cx: i32,
        cy: i32,
        size: u32,
        tip: BrushTip,
        color: Color,
    ) {
        self.stamp_inner(canvas, mask, tx, cx, cy, size, tip, color, None);
    }

    /// Stamp where every kernel cell is additionally kept only with
    /// probability `density`.
    pub fn spray(
        &mut self,
        canvas: &mut PixelCanvas,
        mask: &SelectionMask,
        tx: &mut Transaction,
        cx: i32,
        cy: i32,
        size: u32,
        tip: BrushTip,
        color: Color,
        density: f32,
    ) {
        self.stamp_inner(canvas, mask, tx, cx, cy, size, tip, color, Some(density));
    }

    #[allow(clippy::too_many_arguments)]
    fn stamp_inner(
        &mut self,
        canvas: &mut PixelCanvas,
        mask: &SelectionMask,
        tx: &mut Transaction,
        cx: i32,
        cy: i32,
        size: u32,
        tip: BrushTip,
        color: Color,
        density: Option<f32>,
    ) {
        let w = size.max(1) as i32;
        let x0 = cx - (w - 1) / 2;
        let y0 = cy - (w - 1) / 2;
        // Kernel center in continuous coordinates; for odd sizes this is
        // the middle pixel's center, for even sizes the shared corner.
        let center_x = x0 as f32 + w as f32 * 0.5;
        let center_y = y0 as f32 + w as f32 * 0.5;
        let radius = w as f32 * 0.5;

        for y in y0..y0 + w {
            for x in x0..x0 + w {
                if !canvas.contains(x, y) {
                    continue;
                }
                if tip == BrushTip::Round {
                    let dx = x as f32 + 0.5 - center_x;
                    let dy = y as f32 + 0.5 - center_y;
                    if (dx * dx + dy * dy).sqrt() > radius {
                        continue;
                    }
                }
                if let Some(density) = density
                    && self.rng.random::<f32>() >= density
                {
                    continue;
                }
                let idx = canvas.index(x as u32, y as u32).expect("bounds checked");
                if !mask.allows_index(idx) {
                    continue;
                }
                let current = canvas.get_index(idx);
                if current == color {
                    continue;
                }
                tx.record(idx, current);
                canvas.set_index(idx, color);
            }
        }
    }

    /// Pixel-perfect draw point. At 1-px size the pixel goes through the
    /// adjacency-cleanup buffer; wider strokes degrade to a plain stamp,
    /// where the staircase heuristic has no meaning.
    pub fn pixel_perfect(
        &mut self,
        canvas: &mut PixelCanvas,
        mask: &SelectionMask,
        tx: &mut Transaction,
        x: i32,
        y: i32,
        size: u32,
        color: Color,
    ) {
        if size <= 1 {
            self.pixel_perfect.draw(canvas, mask, tx, x, y, color);
        } else {
            self.stamp(canvas, mask, tx, x, y, size, BrushTip::Round, color);
        }
    }

    /// Finish a stroke: commit every surviving buffered pixel to the
    /// transaction. Must run at gesture end before the transaction is
    /// committed to the ledger.
    pub fn end_stroke(&mut self, canvas: &PixelCanvas, tx: &mut Transaction) {
        self.pixel_perfect.flush(canvas.width(), tx);
    }
}

// ============================================================================
// PIXEL-PERFECT ROLLING BUFFER
// ============================================================================

#[derive(Clone, Copy)]
struct BufferedPixel {
    /// `y << 16 | x`, same packing as the project format's dimensions.
    packed: u32,
    previous: Color,
}

impl BufferedPixel {
    #[inline]
    fn x(self) -> u32 {
        self.packed & 0xffff
    }

    #[inline]
    fn y(self) -> u32 {
        self.packed >> 16
    }
}

/// Rolling window over the most recently drawn 1-px pixels.
///
/// Pixels are painted immediately but their ledger records are held back
/// while they sit in the window. After every draw the whole window is
/// re-checked: a pixel with more than one 4-orthogonal neighbor in the
/// window is the redundant corner a naive stamp leaves on a diagonal,
/// *unless* its exactly-two neighbors form a straight horizontal or
/// vertical pair (the middle of a straight run). Flagged pixels are
/// reverted on canvas and dropped unrecorded. The neighbor-count
/// predicate is a tuned visual heuristic; keep it as is.
struct PixelPerfectBuffer {
    entries: Vec<BufferedPixel>,
    capacity: usize,
}

impl PixelPerfectBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity.max(4) + 1),
            capacity: capacity.max(4),
        }
    }

    fn draw(
        &mut self,
        canvas: &mut PixelCanvas,
        mask: &SelectionMask,
        tx: &mut Transaction,
        x: i32,
        y: i32,
        color: Color,
    ) {
        if !canvas.contains(x, y) {
            return;
        }
        let (x, y) = (x as u32, y as u32);
        let idx = canvas.index(x, y).expect("bounds checked");
        if !mask.allows_index(idx) {
            return;
        }
        let current = canvas.get_index(idx);
        if current == color {
            return;
        }
        canvas.set_index(idx, color);
        self.entries.push(BufferedPixel {
            packed: y << 16 | x,
            previous: current,
        });

        self.cleanup(canvas);

        // Trim to half capacity once the window overflows; pixels falling
        // off the trailing edge have survived cleanup and get committed.
        if self.entries.len() > self.capacity {
            let keep = self.capacity / 2;
            let flush_count = self.entries.len() - keep;
            let width = canvas.width() as usize;
            for entry in self.entries.drain(..flush_count) {
                tx.record(entry.y() as usize * width + entry.x() as usize, entry.previous);
            }
        }
    }

    /// One cleanup pass over the window.
    fn cleanup(&mut self, canvas: &mut PixelCanvas) {
        let mut flagged: Vec<usize> = Vec::new();
        for (i, a) in self.entries.iter().enumerate() {
            let mut horizontal = 0u32;
            let mut vertical = 0u32;
            for (j, b) in self.entries.iter().enumerate() {
                if i == j {
                    continue;
                }
                let dx = a.x().abs_diff(b.x());
                let dy = a.y().abs_diff(b.y());
                if dx == 1 && dy == 0 {
                    horizontal += 1;
                } else if dx == 0 && dy == 1 {
                    vertical += 1;
                }
            }
            let total = horizontal + vertical;
            let straight_pair = total == 2 && (horizontal == 2 || vertical == 2);
            if total > 1 && !straight_pair {
                flagged.push(i);
            }
        }
        for &i in flagged.iter().rev() {
            let entry = self.entries.remove(i);
            canvas.set_pixel(entry.x(), entry.y(), entry.previous);
        }
    }

    /// Record every remaining entry, in draw order, and empty the window.
    fn flush(&mut self, width: u32, tx: &mut Transaction) {
        for entry in self.entries.drain(..) {
            tx.record(entry.y() as usize * width as usize + entry.x() as usize, entry.previous);
        }
    }
}
