use image::{Rgba, RgbaImage, imageops};
use rayon::prelude::*;

use crate::color::{Color, TRANSPARENT};
use crate::error::EngineError;

// ============================================================================
// PIXEL CANVAS - one layer's flat RGBA buffer
// ============================================================================

/// A single layer's pixel buffer plus its placement on screen.
///
/// Invariant: `buf.len() == width * height` at all times; `resize` is the
/// only operation that reallocates.
pub struct PixelCanvas {
    width: u32,
    height: u32,
    buf: Vec<Color>,
    /// Placement of the canvas origin in world/screen space.
    pub offset: (f32, f32),
    /// Rendered size on screen, in device pixels. Drives the
    /// screen-to-canvas scale used by drag gestures.
    pub render_size: (u32, u32),
    locked: bool,
}

impl PixelCanvas {
    /// Create a fully transparent canvas.
    pub fn new(width: u32, height: u32) -> Self {
        Self::new_filled(width, height, TRANSPARENT)
    }

    pub fn new_filled(width: u32, height: u32, color: Color) -> Self {
        Self {
            width,
            height,
            buf: vec![color; (width as usize) * (height as usize)],
            offset: (0.0, 0.0),
            render_size: (width, height),
            locked: false,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn pixels(&self) -> &[Color] {
        &self.buf
    }

    /// Flat index for an in-bounds coordinate.
    #[inline]
    pub fn index(&self, x: u32, y: u32) -> Option<usize> {
        if x < self.width && y < self.height {
            Some(y as usize * self.width as usize + x as usize)
        } else {
            None
        }
    }

    #[inline]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height
    }

    /// Read a pixel; out-of-bounds reads return transparent.
    #[inline]
    pub fn get_pixel(&self, x: u32, y: u32) -> Color {
        match self.index(x, y) {
            Some(i) => self.buf[i],
            None => TRANSPARENT,
        }
    }

    /// Write a pixel; out-of-bounds writes are silently dropped.
    #[inline]
    pub fn set_pixel(&mut self, x: u32, y: u32, color: Color) {
        if let Some(i) = self.index(x, y) {
            self.buf[i] = color;
        }
    }

    #[inline]
    pub fn get_index(&self, index: usize) -> Color {
        self.buf[index]
    }

    #[inline]
    pub fn set_index(&mut self, index: usize, color: Color) {
        self.buf[index] = color;
    }

    // ---- buffer lock --------------------------------------------------------

    /// Claim the buffer for a mutating operation. Returns
    /// [`EngineError::CanvasBusy`] when another operation is in flight so
    /// the caller can tell a dropped gesture from a completed one. The
    /// lock is non-blocking and non-reentrant; nothing is queued.
    pub fn acquire(&mut self) -> Result<(), EngineError> {
        if self.locked {
            log::debug!("canvas busy, gesture dropped");
            return Err(EngineError::CanvasBusy);
        }
        self.locked = true;
        Ok(())
    }

    /// Release the buffer lock. Must run on every exit path of an
    /// operation, including caught faults, or subsequent gestures are
    /// permanently rejected.
    pub fn release(&mut self) {
        self.locked = false;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    // ---- resize -------------------------------------------------------------

    /// Resize the buffer. With `resample` the old content is stretched to
    /// the new dimensions (nearest neighbor, hard pixel edges); without it
    /// the old content stays centered and is padded or cropped. Either way
    /// the old pixels are copied once through an intermediate bitmap.
    pub fn resize(&mut self, new_w: u32, new_h: u32, resample: bool) {
        if new_w == self.width && new_h == self.height {
            return;
        }
        let old = self.to_rgba_image();
        let result = if resample {
            imageops::resize(&old, new_w.max(1), new_h.max(1), imageops::FilterType::Nearest)
        } else {
            // Straight copy, not a blend: partial alpha must survive the
            // resize byte-for-byte.
            let mut dst = RgbaImage::new(new_w.max(1), new_h.max(1));
            let dx = (new_w as i64 - self.width as i64) / 2;
            let dy = (new_h as i64 - self.height as i64) / 2;
            for y in 0..old.height() {
                let ty = y as i64 + dy;
                if ty < 0 || ty >= dst.height() as i64 {
                    continue;
                }
                for x in 0..old.width() {
                    let tx = x as i64 + dx;
                    if tx < 0 || tx >= dst.width() as i64 {
                        continue;
                    }
                    dst.put_pixel(tx as u32, ty as u32, *old.get_pixel(x, y));
                }
            }
            dst
        };
        self.width = result.width();
        self.height = result.height();
        self.buf = result
            .pixels()
            .map(|p| Color::new(p[0], p[1], p[2], p[3]))
            .collect();
    }

    /// Flatten to an `RgbaImage` at native 1:1 scale.
    pub fn to_rgba_image(&self) -> RgbaImage {
        let mut out = RgbaImage::new(self.width.max(1), self.height.max(1));
        for (i, c) in self.buf.iter().enumerate() {
            let x = (i as u32) % self.width;
            let y = (i as u32) / self.width;
            out.put_pixel(x, y, Rgba(c.channels()));
        }
        out
    }

    pub fn from_rgba_image(img: &RgbaImage) -> Self {
        let mut canvas = Self::new(img.width(), img.height());
        for (i, p) in img.pixels().enumerate() {
            canvas.buf[i] = Color::new(p[0], p[1], p[2], p[3]);
        }
        canvas
    }

    // ---- compositor ---------------------------------------------------------

    /// Alpha-blend this canvas onto `target`, scaling each logical pixel
    /// to fill the target. Exact 1x, 2x and 4x integer ratios take
    /// unrolled fast paths; any other ratio falls back to filling an
    /// axis-aligned block per logical pixel. `opacity` scales the source
    /// alpha (`1.0` = unchanged). Pure function of the canvas state.
    pub fn composite_to(&self, target: &mut RgbaImage, opacity: f32) {
        if self.width == 0 || self.height == 0 {
            return;
        }
        let tw = target.width();
        let th = target.height();
        if tw == self.width && th == self.height {
            self.composite_exact(target, opacity, 1);
        } else if tw == self.width * 2 && th == self.height * 2 {
            self.composite_exact(target, opacity, 2);
        } else if tw == self.width * 4 && th == self.height * 4 {
            self.composite_exact(target, opacity, 4);
        } else {
            self.composite_general(target, opacity);
        }
    }

    /// Integer-ratio path: every logical pixel becomes a `k`x`k` block.
    /// The blend is computed once per logical pixel and the row segment is
    /// written `k` times, which is what makes zoomed-in redraws cheap.
    fn composite_exact(&self, target: &mut RgbaImage, opacity: f32, k: u32) {
        let tw = target.width() as usize;
        let raw = target.as_mut();
        for y in 0..self.height {
            let row = y as usize * self.width as usize;
            for x in 0..self.width {
                let src = apply_opacity(self.buf[row + x as usize], opacity);
                if src.is_transparent() {
                    continue;
                }
                let base_x = (x * k) as usize;
                for sy in 0..k {
                    let ty = (y * k + sy) as usize;
                    let line = ty * tw * 4 + base_x * 4;
                    for sx in 0..k as usize {
                        let off = line + sx * 4;
                        let dst = Color::new(raw[off], raw[off + 1], raw[off + 2], raw[off + 3]);
                        let out = src.blend_over(dst);
                        raw[off..off + 4].copy_from_slice(&out.channels());
                    }
                }
            }
        }
    }

    /// General path: fill the axis-aligned target block covered by each
    /// logical pixel. Handles non-integer and anisotropic ratios.
    fn composite_general(&self, target: &mut RgbaImage, opacity: f32) {
        let sx = target.width() as f32 / self.width as f32;
        let sy = target.height() as f32 / self.height as f32;
        let tw = target.width();
        let th = target.height();
        for y in 0..self.height {
            let ty0 = (y as f32 * sy).floor() as u32;
            let ty1 = (((y + 1) as f32 * sy).ceil() as u32).min(th);
            let row = y as usize * self.width as usize;
            for x in 0..self.width {
                let src = apply_opacity(self.buf[row + x as usize], opacity);
                if src.is_transparent() {
                    continue;
                }
                let tx0 = (x as f32 * sx).floor() as u32;
                let tx1 = (((x + 1) as f32 * sx).ceil() as u32).min(tw);
                for ty in ty0..ty1 {
                    for tx in tx0..tx1 {
                        let dst = target.get_pixel(tx, ty);
                        let out = src.blend_over(Color::new(dst[0], dst[1], dst[2], dst[3]));
                        target.put_pixel(tx, ty, Rgba(out.channels()));
                    }
                }
            }
        }
    }
}

#[inline]
fn apply_opacity(c: Color, opacity: f32) -> Color {
    if opacity >= 1.0 {
        c
    } else {
        c.with_alpha((c.a() as f32 * opacity.clamp(0.0, 1.0)).round() as u8)
    }
}

// ============================================================================
// LAYER STACK
// ============================================================================

pub struct Layer {
    pub name: String,
    pub visible: bool,
    pub opacity: f32,
    pub canvas: PixelCanvas,
}

impl Layer {
    pub fn new(name: String, width: u32, height: u32) -> Self {
        Self {
            name,
            visible: true,
            opacity: 1.0,
            canvas: PixelCanvas::new(width, height),
        }
    }
}

/// Ordered stack of layers plus the index receiving edits. Index 0 is the
/// bottom of the stack.
pub struct CanvasState {
    pub width: u32,
    pub height: u32,
    pub layers: Vec<Layer>,
    pub active_layer_index: usize,
}

impl CanvasState {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            layers: vec![Layer::new("Layer 1".to_string(), width, height)],
            active_layer_index: 0,
        }
    }

    pub fn active_layer(&self) -> &Layer {
        &self.layers[self.active_layer_index]
    }

    pub fn active_layer_mut(&mut self) -> &mut Layer {
        &mut self.layers[self.active_layer_index]
    }

    /// Insert a new transparent layer above the active one and make it
    /// active. Returns its index.
    pub fn add_layer(&mut self, name: &str) -> usize {
        let idx = (self.active_layer_index + 1).min(self.layers.len());
        self.layers
            .insert(idx, Layer::new(name.to_string(), self.width, self.height));
        self.active_layer_index = idx;
        idx
    }

    /// Remove a layer. The last remaining layer cannot be removed.
    pub fn remove_layer(&mut self, index: usize) -> bool {
        if self.layers.len() <= 1 || index >= self.layers.len() {
            return false;
        }
        self.layers.remove(index);
        if self.active_layer_index >= self.layers.len() {
            self.active_layer_index = self.layers.len() - 1;
        }
        true
    }

    pub fn move_layer(&mut self, from: usize, to: usize) {
        if from < self.layers.len() && to < self.layers.len() && from != to {
            let layer = self.layers.remove(from);
            self.layers.insert(to, layer);
            self.active_layer_index = to;
        }
    }

    /// Composite all visible layers bottom-to-top into one frame at 1:1
    /// scale. Rows are processed in parallel.
    pub fn composite(&self) -> RgbaImage {
        let w = self.width as usize;
        let mut out = RgbaImage::new(self.width.max(1), self.height.max(1));
        if self.width == 0 || self.height == 0 {
            return out;
        }
        let visible: Vec<(&PixelCanvas, f32)> = self
            .layers
            .iter()
            .filter(|l| l.visible && l.opacity > 0.0)
            .map(|l| (&l.canvas, l.opacity))
            .collect();

        out.as_mut()
            .par_chunks_mut(w * 4)
            .enumerate()
            .for_each(|(y, row)| {
                for x in 0..w {
                    let mut acc = TRANSPARENT;
                    for (canvas, opacity) in &visible {
                        let src = apply_opacity(canvas.pixels()[y * w + x], *opacity);
                        acc = src.blend_over(acc);
                    }
                    row[x * 4..x * 4 + 4].copy_from_slice(&acc.channels());
                }
            });
        out
    }

    /// Composite all visible layers into a target of arbitrary size, going
    /// through each canvas's scaled blit path.
    pub fn composite_scaled(&self, target: &mut RgbaImage) {
        for layer in &self.layers {
            if layer.visible && layer.opacity > 0.0 {
                layer.canvas.composite_to(target, layer.opacity);
            }
        }
    }

    /// Resize every layer in lockstep so dimensions stay uniform.
    pub fn resize(&mut self, new_w: u32, new_h: u32, resample: bool) {
        for layer in &mut self.layers {
            layer.canvas.resize(new_w, new_h, resample);
        }
        self.width = new_w.max(1);
        self.height = new_h.max(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_length_invariant_after_resize() {
        let mut c = PixelCanvas::new(8, 6);
        assert_eq!(c.len(), 48);
        c.resize(3, 5, false);
        assert_eq!(c.len(), 15);
        c.resize(10, 2, true);
        assert_eq!(c.len(), 20);
    }

    #[test]
    fn out_of_bounds_access_is_benign() {
        let mut c = PixelCanvas::new(4, 4);
        assert_eq!(c.get_pixel(99, 0), TRANSPARENT);
        c.set_pixel(99, 99, Color::opaque(1, 2, 3)); // dropped, no panic
        assert_eq!(c.index(4, 0), None);
    }

    #[test]
    fn lock_rejects_second_acquire() {
        let mut c = PixelCanvas::new(2, 2);
        c.acquire().unwrap();
        assert!(matches!(c.acquire(), Err(EngineError::CanvasBusy)));
        c.release();
        assert!(c.acquire().is_ok());
    }

    #[test]
    fn resample_resize_stretches_nearest() {
        let mut c = PixelCanvas::new(2, 1);
        c.set_pixel(0, 0, Color::opaque(255, 0, 0));
        c.set_pixel(1, 0, Color::opaque(0, 0, 255));
        c.resize(4, 2, true);
        // Left half red, right half blue, no interpolation.
        assert_eq!(c.get_pixel(0, 0), Color::opaque(255, 0, 0));
        assert_eq!(c.get_pixel(1, 1), Color::opaque(255, 0, 0));
        assert_eq!(c.get_pixel(2, 0), Color::opaque(0, 0, 255));
        assert_eq!(c.get_pixel(3, 1), Color::opaque(0, 0, 255));
    }

    #[test]
    fn anchored_resize_keeps_content_centered() {
        let mut c = PixelCanvas::new(2, 2);
        let red = Color::opaque(255, 0, 0);
        for y in 0..2 {
            for x in 0..2 {
                c.set_pixel(x, y, red);
            }
        }
        c.resize(4, 4, false);
        assert_eq!(c.get_pixel(0, 0), TRANSPARENT);
        assert_eq!(c.get_pixel(1, 1), red);
        assert_eq!(c.get_pixel(2, 2), red);
        assert_eq!(c.get_pixel(3, 3), TRANSPARENT);
    }

    #[test]
    fn composite_exact_scales() {
        let mut c = PixelCanvas::new(2, 2);
        c.set_pixel(0, 0, Color::opaque(10, 20, 30));
        for k in [1u32, 2, 4] {
            let mut target = RgbaImage::new(2 * k, 2 * k);
            c.composite_to(&mut target, 1.0);
            for sy in 0..k {
                for sx in 0..k {
                    assert_eq!(target.get_pixel(sx, sy).0, [10, 20, 30, 255], "k={k}");
                }
            }
            // Transparent cells leave the target untouched.
            assert_eq!(target.get_pixel(2 * k - 1, 2 * k - 1).0, [0, 0, 0, 0]);
        }
    }

    #[test]
    fn composite_general_covers_target() {
        let mut c = PixelCanvas::new(2, 2);
        let red = Color::opaque(200, 0, 0);
        for y in 0..2 {
            for x in 0..2 {
                c.set_pixel(x, y, red);
            }
        }
        let mut target = RgbaImage::new(3, 5); // non-integer ratio
        c.composite_to(&mut target, 1.0);
        for p in target.pixels() {
            assert_eq!(p.0, [200, 0, 0, 255]);
        }
    }

    #[test]
    fn layer_stack_composites_in_order_with_opacity() {
        let mut state = CanvasState::new(1, 1);
        state.layers[0]
            .canvas
            .set_pixel(0, 0, Color::opaque(0, 0, 0));
        state.add_layer("top");
        state.layers[1]
            .canvas
            .set_pixel(0, 0, Color::opaque(255, 255, 255));
        state.layers[1].opacity = 0.5;

        let frame = state.composite();
        let p = frame.get_pixel(0, 0);
        assert_eq!(p[3], 255);
        assert!((p[0] as i32 - 128).abs() <= 1);

        // Hiding the top layer leaves pure black.
        let mut state2 = state;
        state2.layers[1].visible = false;
        assert_eq!(state2.composite().get_pixel(0, 0).0, [0, 0, 0, 255]);
    }

    #[test]
    fn composite_scaled_stacks_layers_at_zoom() {
        let mut state = CanvasState::new(2, 2);
        state.layers[0].canvas.set_pixel(0, 0, Color::opaque(9, 9, 9));
        state.add_layer("top");
        state.layers[1].canvas.set_pixel(1, 1, Color::opaque(7, 7, 7));

        let mut target = RgbaImage::new(4, 4); // 2x fast path per layer
        state.composite_scaled(&mut target);
        assert_eq!(target.get_pixel(0, 0).0, [9, 9, 9, 255]);
        assert_eq!(target.get_pixel(1, 1).0, [9, 9, 9, 255]);
        assert_eq!(target.get_pixel(2, 2).0, [7, 7, 7, 255]);
        assert_eq!(target.get_pixel(3, 0).0, [0, 0, 0, 0]);
    }

    #[test]
    fn remove_layer_keeps_at_least_one() {
        let mut state = CanvasState::new(2, 2);
        assert!(!state.remove_layer(0));
        state.add_layer("second");
        assert!(state.remove_layer(1));
        assert_eq!(state.layers.len(), 1);
        assert_eq!(state.active_layer_index, 0);
    }
}
