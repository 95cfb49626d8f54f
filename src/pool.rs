//! Mask rasterization pool: a fixed set of worker threads computing
//! point-in-polygon membership for contiguous mask ranges.
//!
//! The protocol is plain message passing. Each job is a pure function of
//! `(start, end, width, polygon)`; workers share no mutable state and
//! results are merged into the [`SelectionMask`] only on the caller's
//! thread, so no locking is needed anywhere.
//!
//! Scheduling discipline: at most one polygon batch is in flight. A newer
//! request overwrites the single pending slot (last writer wins) instead
//! of queueing, and is dispatched only once the in-flight completion
//! counter reaches zero. Rapidly reshaped selections therefore settle on
//! the latest shape without doing the intermediate work.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::selection::{SelectionMask, polygon_mask_range};

/// One worker job: rasterize polygon membership for `start..end`.
pub struct MaskRequest {
    pub start: usize,
    pub end: usize,
    pub width: u32,
    pub height: u32,
    pub polygon: Arc<Vec<(f32, f32)>>,
}

/// Worker answer; `result[i]` corresponds to global pixel index `start+i`.
pub struct MaskResponse {
    pub start: usize,
    pub end: usize,
    pub result: Vec<bool>,
}

pub struct MaskPool {
    job_tx: Option<Sender<MaskRequest>>,
    result_rx: Receiver<MaskResponse>,
    workers: Vec<JoinHandle<()>>,
    worker_count: usize,
    /// Latest not-yet-dispatched polygon. Overwritten, never queued.
    pending: Option<Vec<(f32, f32)>>,
    /// Chunks dispatched and not yet merged back.
    in_flight: usize,
}

impl MaskPool {
    /// Spawn the pool. `worker_count` is clamped to at least 4.
    pub fn new(worker_count: usize) -> Self {
        let worker_count = worker_count.max(4);
        let (job_tx, job_rx) = unbounded::<MaskRequest>();
        let (result_tx, result_rx) = unbounded::<MaskResponse>();

        let workers = (0..worker_count)
            .map(|i| {
                let rx = job_rx.clone();
                let tx = result_tx.clone();
                std::thread::Builder::new()
                    .name(format!("mask-worker-{i}"))
                    .spawn(move || {
                        for job in rx.iter() {
                            let result =
                                polygon_mask_range(job.start, job.end, job.width, &job.polygon);
                            let resp = MaskResponse {
                                start: job.start,
                                end: job.end,
                                result,
                            };
                            if tx.send(resp).is_err() {
                                break;
                            }
                        }
                    })
                    .expect("failed to spawn mask worker")
            })
            .collect();

        Self {
            job_tx: Some(job_tx),
            result_rx,
            workers,
            worker_count,
            pending: None,
            in_flight: 0,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Register a polygon for rasterization. Replaces any pending request
    /// that has not been dispatched yet. Callers handle the degenerate
    /// (<3 vertex) case before scheduling.
    pub fn schedule(&mut self, polygon: Vec<(f32, f32)>) {
        if self.pending.is_some() {
            log::debug!("mask pool: pending polygon superseded");
        }
        self.pending = Some(polygon);
    }

    /// True when no batch is running and nothing is waiting to run.
    pub fn is_idle(&self) -> bool {
        self.in_flight == 0 && self.pending.is_none()
    }

    /// Frame hook: merge any finished chunks into `mask`, then dispatch
    /// the pending batch once the previous one has fully completed.
    pub fn pump(&mut self, mask: &mut SelectionMask) {
        while let Ok(resp) = self.result_rx.try_recv() {
            mask.merge_range(resp.start, &resp.result);
            self.in_flight -= 1;
        }
        if self.in_flight == 0
            && let Some(polygon) = self.pending.take()
        {
            self.dispatch(polygon, mask);
        }
    }

    /// Split the mask index range into near-equal contiguous chunks, one
    /// job per worker.
    fn dispatch(&mut self, polygon: Vec<(f32, f32)>, mask: &SelectionMask) {
        let total = mask.len();
        let Some(job_tx) = &self.job_tx else { return };
        if total == 0 {
            return;
        }
        let polygon = Arc::new(polygon);
        let n = self.worker_count;
        let base = total / n;
        let rem = total % n;
        let mut start = 0usize;
        let mut sent = 0usize;
        for i in 0..n {
            let len = base + usize::from(i < rem);
            if len == 0 {
                continue;
            }
            let end = start + len;
            let job = MaskRequest {
                start,
                end,
                width: mask.width(),
                height: mask.height(),
                polygon: Arc::clone(&polygon),
            };
            if job_tx.send(job).is_err() {
                log::warn!("mask pool: worker channel closed, dropping batch");
                break;
            }
            start = end;
            sent += 1;
        }
        self.in_flight = sent;
    }
}

impl Drop for MaskPool {
    fn drop(&mut self) {
        // Closing the job channel lets every worker's iterator end.
        self.job_tx.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn drain(pool: &mut MaskPool, mask: &mut SelectionMask) {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            pool.pump(mask);
            if pool.is_idle() {
                return;
            }
            assert!(Instant::now() < deadline, "mask pool did not drain");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn triangle_matches_serial_reference() {
        let mut pool = MaskPool::new(4);
        let mut mask = SelectionMask::new(8, 8);
        let triangle = vec![(0.0, 0.0), (8.0, 0.0), (0.0, 8.0)];

        pool.schedule(triangle.clone());
        drain(&mut pool, &mut mask);

        let reference = polygon_mask_range(0, 64, 8, &triangle);
        assert_eq!(mask.bits(), &reference[..]);
        // Sanity: the triangle selects some but not all pixels.
        assert!(mask.bits().iter().any(|&b| b));
        assert!(mask.bits().iter().any(|&b| !b));
    }

    #[test]
    fn partition_is_invariant_across_pool_sizes() {
        let polygon = vec![(1.0, 0.5), (14.5, 3.0), (9.0, 13.0), (0.5, 9.5)];
        let reference = polygon_mask_range(0, 15 * 13, 15, &polygon);
        for workers in [4usize, 5, 7] {
            let mut pool = MaskPool::new(workers);
            let mut mask = SelectionMask::new(15, 13);
            pool.schedule(polygon.clone());
            drain(&mut pool, &mut mask);
            assert_eq!(mask.bits(), &reference[..], "workers={workers}");
        }
    }

    #[test]
    fn newer_request_supersedes_pending() {
        let mut pool = MaskPool::new(4);
        let mut mask = SelectionMask::new(8, 8);
        let first = vec![(0.0, 0.0), (8.0, 0.0), (8.0, 8.0), (0.0, 8.0)];
        let second = vec![(0.0, 0.0), (2.0, 0.0), (0.0, 2.0)];

        // Both scheduled before any pump: only the second may run.
        pool.schedule(first);
        pool.schedule(second.clone());
        drain(&mut pool, &mut mask);

        let reference = polygon_mask_range(0, 64, 8, &second);
        assert_eq!(mask.bits(), &reference[..]);
    }

    #[test]
    fn replacement_waits_for_in_flight_batch() {
        let mut pool = MaskPool::new(4);
        let mut mask = SelectionMask::new(16, 16);
        let first = vec![(0.0, 0.0), (16.0, 0.0), (16.0, 16.0), (0.0, 16.0)];
        let second = vec![(0.0, 0.0), (4.0, 0.0), (0.0, 4.0)];

        pool.schedule(first);
        pool.pump(&mut mask); // dispatches the first batch
        pool.schedule(second.clone());
        drain(&mut pool, &mut mask);

        // Whatever interleaving occurred, the mask settles on the latest shape.
        let reference = polygon_mask_range(0, 256, 16, &second);
        assert_eq!(mask.bits(), &reference[..]);
    }
}
