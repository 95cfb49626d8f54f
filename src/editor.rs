//! Gesture-level facade over the engine components.
//!
//! The external widget layer delivers normalized pointer gestures and
//! calls into this type; the render loop calls [`Editor::tick`] once per
//! frame to pump the mask pool and advance any cooperative jobs (animated
//! undo replay, anti-aliased rotation coverage). Everything here runs on
//! one thread; the only real parallelism lives inside the mask pool.

use image::RgbaImage;

use crate::canvas::{CanvasState, PixelCanvas};
use crate::color::Color;
use crate::config::EngineSettings;
use crate::error::EngineError;
use crate::history::{EditLedger, ReplayCursor, Transaction};
use crate::ops::brush::BrushEngine;
use crate::ops::drag::{CoverageJob, DragGroup, ExtractMode, extract};
use crate::ops::fill::{FillOrder, fill_all_matching, flood_fill};
use crate::ops::shapes::{self, StrokeBrush};
use crate::pool::MaskPool;
use crate::selection::SelectionMask;

/// Replay pacing for undo/redo.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ReplaySpeed {
    /// Apply the whole transaction within this call.
    #[default]
    Fast,
    /// Spread the replay over the frame budget for the step-by-step
    /// animation; keeps the canvas locked until it finishes.
    Animated,
}

struct StrokeState {
    tx: Transaction,
    brush: StrokeBrush,
    size: u32,
    color: Color,
    layer: usize,
    last: (i32, i32),
}

struct DragSession {
    tx: Transaction,
    group: DragGroup,
    layer: usize,
}

pub struct Editor {
    pub state: CanvasState,
    pub selection: SelectionMask,
    pub ledger: EditLedger,
    pub settings: EngineSettings,
    brush: BrushEngine,
    pool: MaskPool,
    stroke: Option<StrokeState>,
    drag: Option<DragSession>,
    replay: Option<(ReplayCursor, usize)>,
    coverage: Option<CoverageJob>,
}

impl Editor {
    pub fn new(width: u32, height: u32, settings: EngineSettings) -> Self {
        let settings = settings.clamped();
        Self {
            state: CanvasState::new(width, height),
            selection: SelectionMask::new(width, height),
            ledger: EditLedger::new(settings.undo_capacity, settings.replay_frames),
            brush: BrushEngine::new(settings.pixel_perfect_buffer),
            pool: MaskPool::new(settings.mask_workers),
            stroke: None,
            drag: None,
            replay: None,
            coverage: None,
            settings,
        }
    }

    // ---- frame loop ---------------------------------------------------------

    /// Per-frame hook. Merges finished mask chunks, advances an animated
    /// replay, and advances an anti-aliased coverage job. Cheap when
    /// nothing is pending.
    pub fn tick(&mut self) {
        self.pool.pump(&mut self.selection);

        if let Some((mut cursor, layer)) = self.replay.take() {
            let canvas = &mut self.state.layers[layer].canvas;
            if cursor.step(canvas) {
                self.ledger.finish_replay(cursor);
                canvas.release();
            } else {
                self.replay = Some((cursor, layer));
            }
        }

        if let Some(mut job) = self.coverage.take() {
            if job.step() {
                if let Some(session) = &mut self.drag {
                    session.group.set_coverage(job.finish());
                }
            } else {
                self.coverage = Some(job);
            }
        }
    }

    /// Composite the layer stack into a fresh 1:1 frame.
    pub fn render(&self) -> RgbaImage {
        self.state.composite()
    }

    // ---- strokes ------------------------------------------------------------

    /// Pointer-down: open a gesture transaction and stamp the first
    /// point. Fails with [`EngineError::CanvasBusy`] while another
    /// operation holds the active layer.
    pub fn begin_stroke(
        &mut self,
        x: i32,
        y: i32,
        brush: StrokeBrush,
        size: u32,
        color: Color,
    ) -> Result<(), EngineError> {
        // A stroke may still be open on another layer; dropping it here
        // would orphan its transaction and leave that layer locked.
        if self.stroke.is_some() {
            return Err(EngineError::CanvasBusy);
        }
        let layer = self.state.active_layer_index;
        self.state.layers[layer].canvas.acquire()?;
        let mut tx = Transaction::new();
        shapes::draw_point(
            &mut self.brush,
            &mut self.state.layers[layer].canvas,
            &self.selection,
            &mut tx,
            x,
            y,
            size,
            color,
            brush,
        );
        self.stroke = Some(StrokeState {
            tx,
            brush,
            size,
            color,
            layer,
            last: (x, y),
        });
        Ok(())
    }

    /// Pointer-move: rasterize a segment from the previous point.
    /// Without an open stroke this is a benign no-op.
    pub fn move_stroke(&mut self, x: i32, y: i32) {
        let Some(stroke) = self.stroke.as_mut() else {
            return;
        };
        shapes::draw_line(
            &mut self.brush,
            &mut self.state.layers[stroke.layer].canvas,
            &self.selection,
            &mut stroke.tx,
            stroke.last,
            (x, y),
            stroke.size,
            stroke.color,
            stroke.brush,
        );
        stroke.last = (x, y);
    }

    /// Pointer-up: flush the pixel-perfect buffer, commit the gesture and
    /// release the layer.
    pub fn end_stroke(&mut self) {
        let Some(mut stroke) = self.stroke.take() else {
            return;
        };
        let canvas = &mut self.state.layers[stroke.layer].canvas;
        self.brush.end_stroke(canvas, &mut stroke.tx);
        canvas.release();
        self.ledger.commit(stroke.tx);
    }

    /// One-shot rectangle outline gesture.
    pub fn stroke_rect(
        &mut self,
        corner_a: (i32, i32),
        corner_b: (i32, i32),
        brush: StrokeBrush,
        size: u32,
        color: Color,
    ) -> Result<(), EngineError> {
        self.shape_gesture(|engine, canvas, selection, tx| {
            shapes::draw_rect(engine, canvas, selection, tx, corner_a, corner_b, size, color, brush);
        })
    }

    /// One-shot ellipse outline gesture.
    pub fn stroke_ellipse(
        &mut self,
        center: (f32, f32),
        radii: (f32, f32),
        brush: StrokeBrush,
        size: u32,
        color: Color,
    ) -> Result<(), EngineError> {
        self.shape_gesture(|engine, canvas, selection, tx| {
            shapes::draw_ellipse(engine, canvas, selection, tx, center, radii, size, color, brush);
        })
    }

    fn shape_gesture(
        &mut self,
        op: impl FnOnce(&mut BrushEngine, &mut PixelCanvas, &SelectionMask, &mut Transaction),
    ) -> Result<(), EngineError> {
        let layer = self.state.active_layer_index;
        let canvas = &mut self.state.layers[layer].canvas;
        canvas.acquire()?;
        let mut tx = Transaction::new();
        op(&mut self.brush, canvas, &self.selection, &mut tx);
        self.brush.end_stroke(canvas, &mut tx);
        canvas.release();
        self.ledger.commit(tx);
        Ok(())
    }

    // ---- fills --------------------------------------------------------------

    /// Contiguous flood fill as a single gesture. Returns the number of
    /// recolored pixels.
    pub fn fill(
        &mut self,
        seed: (u32, u32),
        color: Color,
        order: FillOrder,
    ) -> Result<usize, EngineError> {
        let canvas = &mut self.state.layers[self.state.active_layer_index].canvas;
        canvas.acquire()?;
        let mut tx = Transaction::new();
        let n = flood_fill(canvas, &self.selection, &mut tx, seed, color, order);
        canvas.release();
        self.ledger.commit(tx);
        Ok(n)
    }

    /// Non-contiguous fill: every pixel matching the seed color.
    pub fn fill_all(&mut self, seed: (u32, u32), color: Color) -> Result<usize, EngineError> {
        let canvas = &mut self.state.layers[self.state.active_layer_index].canvas;
        canvas.acquire()?;
        let mut tx = Transaction::new();
        let n = fill_all_matching(canvas, &mut tx, seed, color);
        canvas.release();
        self.ledger.commit(tx);
        Ok(n)
    }

    // ---- undo / redo --------------------------------------------------------

    /// Undo the most recent gesture on the active layer. `false` on an
    /// empty stack. Animated replays run across subsequent ticks and keep
    /// the layer locked until done.
    pub fn undo(&mut self, speed: ReplaySpeed) -> Result<bool, EngineError> {
        self.replay_gesture(speed, true)
    }

    pub fn redo(&mut self, speed: ReplaySpeed) -> Result<bool, EngineError> {
        self.replay_gesture(speed, false)
    }

    fn replay_gesture(&mut self, speed: ReplaySpeed, undo: bool) -> Result<bool, EngineError> {
        let layer = self.state.active_layer_index;
        let canvas = &mut self.state.layers[layer].canvas;
        canvas.acquire()?;
        match speed {
            ReplaySpeed::Fast => {
                let done = if undo {
                    self.ledger.undo(canvas)
                } else {
                    self.ledger.redo(canvas)
                };
                canvas.release();
                Ok(done)
            }
            ReplaySpeed::Animated => {
                let cursor = if undo {
                    self.ledger.begin_undo_animated()
                } else {
                    self.ledger.begin_redo_animated()
                };
                match cursor {
                    Some(cursor) => {
                        self.replay = Some((cursor, layer));
                        Ok(true)
                    }
                    None => {
                        canvas.release();
                        Ok(false)
                    }
                }
            }
        }
    }

    /// True while an animated replay still has records to apply.
    pub fn replay_in_progress(&self) -> bool {
        self.replay.is_some()
    }

    // ---- selection ----------------------------------------------------------

    pub fn select_all(&mut self) {
        self.selection.reset();
    }

    pub fn select_rect(&mut self, min_x: u32, min_y: u32, max_x: u32, max_y: u32) {
        self.selection.select_rect(min_x, min_y, max_x, max_y);
    }

    /// Schedule a polygon selection on the worker pool. Fewer than three
    /// vertices cannot enclose anything and reset the mask instead.
    pub fn select_polygon(&mut self, polygon: Vec<(f32, f32)>) {
        if polygon.len() < 3 {
            self.selection.reset();
            return;
        }
        self.pool.schedule(polygon);
    }

    /// True once no polygon batch is pending or running.
    pub fn selection_settled(&self) -> bool {
        self.pool.is_idle()
    }

    // ---- drag transform -----------------------------------------------------

    /// Start a drag session by detaching pixels from the active layer.
    /// The layer stays locked until [`Editor::end_drag`] or
    /// [`Editor::cancel_drag`].
    pub fn begin_drag(&mut self, seed: (u32, u32), mode: ExtractMode) -> Result<(), EngineError> {
        if self.drag.is_some() {
            return Err(EngineError::CanvasBusy);
        }
        let layer = self.state.active_layer_index;
        let canvas = &mut self.state.layers[layer].canvas;
        canvas.acquire()?;
        let mut tx = Transaction::new();
        let group = extract(canvas, &self.selection, &mut tx, seed, mode);
        if group.is_empty() {
            canvas.release();
            self.ledger.commit(tx);
            return Ok(());
        }
        self.drag = Some(DragSession { tx, group, layer });
        Ok(())
    }

    pub fn drag_in_progress(&self) -> bool {
        self.drag.is_some()
    }

    /// Move the detached group by a screen-space delta.
    pub fn drag_by(&mut self, screen_dx: f32, screen_dy: f32) {
        let Some(session) = self.drag.as_mut() else {
            return;
        };
        let canvas = &self.state.layers[session.layer].canvas;
        let scale = canvas.render_size.0 as f32 / canvas.width().max(1) as f32;
        session.group.drag(screen_dx, screen_dy, scale);
    }

    /// Rotate the detached group about its bounding-box center. With
    /// `antialias` a coverage job starts and is advanced by `tick`; the
    /// commit uses whatever coverage finished by then.
    pub fn rotate_drag(&mut self, theta: f32, antialias: bool) {
        let Some(session) = self.drag.as_mut() else {
            return;
        };
        let pivot = session.group.pivot();
        session.group.rotate(theta, pivot);
        self.coverage = antialias.then(|| session.group.begin_coverage());
    }

    /// Composite the group back and close the session as one gesture.
    pub fn end_drag(&mut self, blend: bool, override_mask: bool) {
        let Some(mut session) = self.drag.take() else {
            return;
        };
        self.coverage = None;
        let canvas = &mut self.state.layers[session.layer].canvas;
        session
            .group
            .commit(canvas, &self.selection, &mut session.tx, blend, override_mask);
        canvas.release();
        self.ledger.commit(session.tx);
    }

    /// Abandon the session: restore the extracted pixels and record
    /// nothing in the ledger.
    pub fn cancel_drag(&mut self) {
        let Some(session) = self.drag.take() else {
            return;
        };
        self.coverage = None;
        let canvas = &mut self.state.layers[session.layer].canvas;
        session.tx.rollback(canvas);
        canvas.release();
    }

    // ---- dimensions ---------------------------------------------------------

    /// Resize canvas, layers and selection together.
    pub fn resize(&mut self, new_w: u32, new_h: u32, resample: bool) {
        self.state.resize(new_w, new_h, resample);
        self.selection.resize(self.state.width, self.state.height);
    }
}
