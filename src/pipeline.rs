// Copyright 2025 Dustin McAfee
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The frame pipeline.
//!
//! Two cooperating threads meet here. The producer (the compositor)
//! renders into a buffer borrowed through [`Core::render_frame`] and
//! hands it off by pointer rotation: the rendered buffer becomes a send
//! buffer and a recycled one becomes the next render target. With both
//! send slots occupied the frame is dropped silently (back-pressure).
//!
//! The send thread takes each pending buffer and, per frame: recovers
//! from asynchronously observed errors, runs scroll detection, selects
//! the dirty-tile source (producer damage or reference diff), compresses
//! dirty tiles across the worker pool, assembles draw-command batches
//! bounded by the transport's atomic-write unit, streams them pipelined
//! against the reply drain, and commits the sent tiles into the
//! previous-frame reference.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use bytes::{BufMut, BytesMut};
use log::{debug, error, info, trace, warn};

use crate::compress::{TileEncoder, TileResult, TileTag, MAX_TILE_RESULT};
use crate::drain::Drain;
use crate::frame::{DirtyMap, FrameBuffer};
use crate::pool::WorkerPool;
use crate::resources::{DrawResources, Endpoints};
use crate::scroll::{self, ScrollDetector, ScrollRegion};
use crate::transport::Transport;
use crate::wire;
use crate::{Error, Point, Rect, Result, SENTINEL, TILE_SIZE};

/// Tunables for [`Core::start`].
#[derive(Debug, Clone)]
pub struct CoreOptions {
    /// Compression worker threads; 0 selects
    /// [`WorkerPool::default_workers`].
    pub workers: usize,
    /// Run the scroll detector. There is no per-frame inhibition beyond
    /// this switch.
    pub detect_scroll: bool,
    /// Maximum pipelined writes left outstanding before the send thread
    /// throttles against the drain.
    pub throttle_depth: usize,
    /// ARGB border fill drawn over the window area the tile grid does
    /// not cover.
    pub border_color: u32,
}

impl Default for CoreOptions {
    fn default() -> Self {
        CoreOptions {
            workers: 0,
            detect_scroll: true,
            throttle_depth: 2,
            border_color: 0xFF00_0000,
        }
    }
}

/// Everything the producer and send thread share under the frame lock.
struct FrameState {
    framebuf: FrameBuffer,
    send_buf: [FrameBuffer; 2],
    dirty: [DirtyMap; 2],
    dirty_valid: [bool; 2],
    staging: DirtyMap,
    staging_valid: bool,
    pending: Option<usize>,
    active: Option<usize>,
    send_full: bool,
    window_changed: bool,
    shutdown: bool,
}

impl FrameState {
    fn new(width: usize, height: usize) -> Self {
        FrameState {
            framebuf: FrameBuffer::new(width, height),
            send_buf: [
                FrameBuffer::new(width, height),
                FrameBuffer::new(width, height),
            ],
            dirty: [DirtyMap::new(width, height), DirtyMap::new(width, height)],
            dirty_valid: [false, false],
            staging: DirtyMap::new(width, height),
            staging_valid: false,
            pending: None,
            active: None,
            send_full: true, // paint everything once at startup
            window_changed: false,
            shutdown: false,
        }
    }

    /// The send slot that is neither active nor pending, if any.
    fn pick_slot(&self) -> Option<usize> {
        (0..self.send_buf.len()).find(|&b| self.active != Some(b) && self.pending != Some(b))
    }

    fn resize(&mut self, width: usize, height: usize) {
        self.framebuf.resize(width, height);
        for buf in &mut self.send_buf {
            buf.resize(width, height);
        }
        for map in &mut self.dirty {
            map.resize(width, height);
        }
        self.dirty_valid = [false, false];
        self.staging.resize(width, height);
        self.staging_valid = false;
        self.pending = None;
        self.active = None;
        self.send_full = true;
    }
}

struct Shared {
    frame: Mutex<FrameState>,
    frame_cond: Condvar,
    force_full: AtomicBool,
    running: AtomicBool,
}

/// Handle owning the send thread, drain thread and worker pool.
///
/// One producer thread drives [`render_frame`](Core::render_frame);
/// errors surface only through [`is_running`](Core::is_running) and the
/// observable effect of dropped frames.
pub struct Core {
    shared: Arc<Shared>,
    send_thread: Option<JoinHandle<()>>,
}

impl Core {
    /// Open draw resources over `transport`, start the drain and send
    /// threads, and return the producer handle.
    pub fn start(transport: Transport, endpoints: Endpoints, opts: CoreOptions) -> Result<Core> {
        let min_batch = MAX_TILE_RESULT + wire::LOAD_HEADER_LEN + wire::COMPOSITE_LEN;
        if transport.max_batch() < min_batch {
            return Err(Error::Protocol(format!(
                "atomic write unit {} cannot hold one tile ({min_batch} bytes)",
                transport.max_batch()
            )));
        }
        let transport = Arc::new(transport);
        let resources = DrawResources::open(Arc::clone(&transport), endpoints, opts.border_color)?;
        let drain = Drain::start(Arc::clone(&transport))?;
        let workers = if opts.workers == 0 {
            WorkerPool::default_workers()
        } else {
            opts.workers
        };
        let pool = WorkerPool::new(workers);
        let width = resources.width();
        let height = resources.height();
        let shared = Arc::new(Shared {
            frame: Mutex::new(FrameState::new(width, height)),
            frame_cond: Condvar::new(),
            force_full: AtomicBool::new(false),
            running: AtomicBool::new(true),
        });
        let encoders = (0..pool.slots()).map(|_| Mutex::new(TileEncoder::new())).collect();
        let ctx = SendCtx {
            shared: Arc::clone(&shared),
            transport,
            drain,
            resources,
            pool,
            detector: ScrollDetector::new(),
            encoders,
            results: Vec::new(),
            jobs: Vec::new(),
            prev: FrameBuffer::new(width, height),
            work_dirty: DirtyMap::new(width, height),
            alpha_delta: false,
            seen_errors: 0,
            opts,
        };
        let send_thread = thread::Builder::new()
            .name("send".into())
            .spawn(move || send_loop(ctx))?;
        Ok(Core {
            shared,
            send_thread: Some(send_thread),
        })
    }

    /// Render one frame and enqueue it.
    ///
    /// The closure receives the producer-side buffer and the damage
    /// staging map; mark the tiles (or rectangles) it repainted, or mark
    /// nothing to fall back to a full reference diff. Returns `false`
    /// when the frame was dropped for back-pressure (both send slots
    /// busy) or the core is shutting down.
    pub fn render_frame<F>(&self, render: F) -> bool
    where
        F: FnOnce(&mut FrameBuffer, &mut DirtyMap),
    {
        let (mut fb, mut staging, was_staged) = {
            let mut st = self.shared.frame.lock().unwrap();
            if st.shutdown || st.framebuf.width() == 0 {
                return false;
            }
            let fb = std::mem::replace(&mut st.framebuf, FrameBuffer::new(0, 0));
            let staging = std::mem::replace(&mut st.staging, DirtyMap::new(0, 0));
            (fb, staging, st.staging_valid)
        };
        render(&mut fb, &mut staging);
        let staged = was_staged || staging.any();

        let mut st = self.shared.frame.lock().unwrap();
        if st.shutdown {
            return false;
        }
        if fb.width() != st.send_buf[0].width() || fb.height() != st.send_buf[0].height() {
            // Resized mid-render: the state already holds right-sized
            // buffers, so this frame is stale. Drop it.
            st.staging_valid = false;
            return false;
        }
        let Some(b) = st.pick_slot() else {
            // Back-pressure: keep the rendered frame as the next render
            // target and let its damage accumulate in staging.
            st.framebuf = fb;
            st.staging = staging;
            st.staging_valid = staged;
            trace!("frame dropped: both send slots busy");
            return false;
        };
        let recycled = std::mem::replace(&mut st.send_buf[b], fb);
        st.framebuf = recycled;
        if staged {
            st.dirty[b].copy_from(&staging);
        }
        st.dirty_valid[b] = staged;
        // An untaken pending frame is superseded by this one. The remote
        // will jump straight from the last sent frame to this frame, so
        // the orphan's damage has to ride along; unknown damage on
        // either side falls back to the reference diff.
        if let Some(p) = st.pending.replace(b) {
            let valid = staged && st.dirty_valid[p];
            if valid {
                let (head, tail) = st.dirty.split_at_mut(1);
                let (db, dp) = if b == 0 {
                    (&mut head[0], &tail[0])
                } else {
                    (&mut tail[0], &head[0])
                };
                db.merge_from(dp);
            }
            st.dirty_valid[b] = valid;
            trace!("pending frame superseded before send");
        }
        staging.clear();
        st.staging = staging;
        st.staging_valid = false;
        if self.shared.force_full.swap(false, Ordering::AcqRel) {
            st.send_full = true;
        }
        st.pending = Some(b);
        self.shared.frame_cond.notify_all();
        true
    }

    /// Force the next frame to retransmit every tile.
    pub fn force_full_frame(&self) {
        self.shared.force_full.store(true, Ordering::Release);
    }

    /// Tell the send thread the window may have moved or resized.
    pub fn notify_window_changed(&self) {
        let mut st = self.shared.frame.lock().unwrap();
        st.window_changed = true;
        self.shared.frame_cond.notify_all();
    }

    /// False once the send or drain thread has stopped (remote window
    /// deleted, fatal transport failure, or shutdown).
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Cooperative shutdown: stop the send thread, drain outstanding
    /// replies, release remote images.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        {
            let mut st = self.shared.frame.lock().unwrap();
            st.shutdown = true;
            self.shared.frame_cond.notify_all();
        }
        if let Some(handle) = self.send_thread.take() {
            let _ = handle.join();
        }
        self.shared.running.store(false, Ordering::Release);
    }
}

impl Drop for Core {
    fn drop(&mut self) {
        if self.send_thread.is_some() {
            self.stop();
        }
    }
}

/// One dirty tile to compress.
struct TileJob {
    x: usize,
    y: usize,
    w: usize,
    h: usize,
    delta_ok: bool,
}

/// State owned by the send thread.
struct SendCtx {
    shared: Arc<Shared>,
    transport: Arc<Transport>,
    drain: Drain,
    resources: DrawResources,
    pool: WorkerPool,
    detector: ScrollDetector,
    encoders: Vec<Mutex<TileEncoder>>,
    results: Vec<Mutex<TileResult>>,
    jobs: Vec<TileJob>,
    prev: FrameBuffer,
    work_dirty: DirtyMap,
    alpha_delta: bool,
    seen_errors: usize,
    opts: CoreOptions,
}

enum Wake {
    Shutdown,
    WindowChanged,
    Frame,
}

fn send_loop(mut ctx: SendCtx) {
    loop {
        match ctx.wait_for_work() {
            Wake::Shutdown => break,
            Wake::WindowChanged => {
                if let Err(e) = ctx.handle_window_changed() {
                    error!("window change handling failed: {e}");
                    break;
                }
                continue;
            }
            Wake::Frame => {}
        }
        if !ctx.drain.is_running() {
            error!("drain thread died; shutting down");
            break;
        }
        if ctx.transport.window_deleted() {
            info!("remote window deleted; shutting down");
            break;
        }
        if let Err(e) = ctx.recover_errors() {
            error!("error recovery failed: {e}");
            break;
        }

        let Some((slot, cur, send_full, dirty_valid)) = ctx.take_pending() else {
            continue;
        };
        let outcome = ctx.emit_frame(&cur, send_full, dirty_valid);
        {
            let mut st = ctx.shared.frame.lock().unwrap();
            // Stale slots after a mid-frame resize keep their new buffer.
            if st.send_buf[slot].width() == cur.width()
                && st.send_buf[slot].height() == cur.height()
            {
                st.send_buf[slot] = cur;
            }
            st.active = None;
        }
        match outcome {
            Ok(tiles) => {
                if tiles > 0 && !ctx.alpha_delta {
                    debug!("first non-empty frame sent; enabling alpha-delta tiles");
                    ctx.alpha_delta = true;
                }
            }
            Err(e) => {
                error!("frame emission failed: {e}");
                break;
            }
        }
    }
    ctx.shutdown();
}

impl SendCtx {
    fn wait_for_work(&self) -> Wake {
        let mut st = self.shared.frame.lock().unwrap();
        loop {
            if st.shutdown {
                return Wake::Shutdown;
            }
            if st.window_changed {
                st.window_changed = false;
                return Wake::WindowChanged;
            }
            if st.pending.is_some() {
                return Wake::Frame;
            }
            st = self.shared.frame_cond.wait(st).unwrap();
        }
    }

    /// Step 3: claim the pending buffer; its dirty map is copied out so
    /// the lock is not held during the diff.
    fn take_pending(&mut self) -> Option<(usize, FrameBuffer, bool, bool)> {
        let mut st = self.shared.frame.lock().unwrap();
        let b = st.pending.take()?;
        st.active = Some(b);
        let cur = std::mem::replace(&mut st.send_buf[b], FrameBuffer::new(0, 0));
        let send_full = st.send_full;
        st.send_full = false;
        let dirty_valid = st.dirty_valid[b];
        if dirty_valid {
            self.work_dirty.copy_from(&st.dirty[b]);
        }
        Some((b, cur, send_full, dirty_valid))
    }

    /// Step 2: recovery for errors the drain observed since last frame.
    fn recover_errors(&mut self) -> Result<()> {
        if self.transport.take_short_write() {
            warn!("remote short write; resetting reference and forcing full frame");
            self.prev.fill(0);
            self.alpha_delta = false;
            self.shared.force_full_now();
        }
        let errors = self.drain.errors();
        if errors > self.seen_errors {
            warn!(
                "{} error replies since last frame; invalidating reference",
                errors - self.seen_errors
            );
            self.seen_errors = errors;
            self.prev.fill(SENTINEL);
            self.alpha_delta = false;
            self.shared.force_full_now();
        }
        if self.transport.take_unknown_id() {
            info!("remote lost an image id; re-binding window");
            self.drain.pause();
            let resize = self.resources.rebind_window()?;
            self.drain.resume();
            if resize {
                let mut st = self.shared.frame.lock().unwrap();
                st.window_changed = true;
            }
            self.shared.force_full_now();
        }
        Ok(())
    }

    /// Step 1 (window-changed branch): re-query geometry inside a drain
    /// quiescence window; resize if the dimensions moved.
    fn handle_window_changed(&mut self) -> Result<()> {
        self.drain.pause();
        let result = self.resources.read_window_rect();
        match result {
            Ok(rect) => {
                let cur_win = self.resources.window_rect();
                if rect.width() != cur_win.width() || rect.height() != cur_win.height() {
                    self.apply_resize(rect)?;
                } else if rect != cur_win {
                    debug!("window moved: {:?} -> {:?}", cur_win, rect);
                    self.resources.set_window_rect(rect);
                }
            }
            Err(e) => warn!("window geometry re-query failed: {e}"),
        }
        self.drain.resume();
        Ok(())
    }

    /// Reallocate remote images and every buffer for new window
    /// dimensions. Failure keeps the old geometry. The pending frame, if
    /// any, is discarded (it has stale dimensions).
    fn apply_resize(&mut self, window: Rect) -> Result<()> {
        if self.resources.reallocate(window).is_err() {
            // Old dimensions retained; nothing else changes.
            return Ok(());
        }
        let width = self.resources.width();
        let height = self.resources.height();
        {
            let mut st = self.shared.frame.lock().unwrap();
            st.resize(width, height);
        }
        self.prev.resize(width, height);
        self.work_dirty.resize(width, height);
        self.alpha_delta = false;
        Ok(())
    }

    /// Steps 4-11 for one taken frame. Returns the number of tiles
    /// emitted.
    fn emit_frame(&mut self, cur: &FrameBuffer, send_full: bool, dirty_valid: bool) -> Result<usize> {
        let width = cur.width();
        let height = cur.height();

        // Step 4: scroll prefix.
        let mut scrolls: Vec<ScrollRegion> = Vec::new();
        if self.opts.detect_scroll && !send_full {
            let candidates = self.detector.detect(cur, &self.prev, &self.pool);
            let mut enc = self.encoders[0].lock().unwrap();
            for region in candidates.into_iter().filter(|r| r.detected) {
                if scroll::verify(cur, &self.prev, &region, &mut enc) {
                    scroll::apply(&mut self.prev, &region);
                    scrolls.push(region);
                }
            }
        }

        // Step 5: dirty source. Producer damage is only trusted when no
        // scroll rewrote the reference underneath it.
        let use_producer_damage = dirty_valid && scrolls.is_empty() && !send_full;

        // Step 6: build tile jobs.
        self.jobs.clear();
        for ty in (0..height).step_by(TILE_SIZE) {
            let h = (height - ty).min(TILE_SIZE);
            for tx in (0..width).step_by(TILE_SIZE) {
                let w = (width - tx).min(TILE_SIZE);
                let dirty = if send_full {
                    true
                } else if use_producer_damage {
                    self.work_dirty.is_dirty(tx / TILE_SIZE, ty / TILE_SIZE)
                } else {
                    !cur.tile_equal(&self.prev, tx, ty, w, h)
                };
                if !dirty {
                    continue;
                }
                let delta_ok =
                    self.alpha_delta && !self.prev.perimeter_contains(tx, ty, w, h, SENTINEL);
                self.jobs.push(TileJob {
                    x: tx,
                    y: ty,
                    w,
                    h,
                    delta_ok,
                });
            }
        }

        // Step 7: throttle, then compress across the pool.
        self.drain.throttle(self.opts.throttle_depth);
        while self.results.len() < self.jobs.len() {
            self.results.push(Mutex::new(TileResult::new()));
        }
        let jobs = &self.jobs;
        let results = &self.results;
        let encoders = &self.encoders;
        let prev = &self.prev;
        self.pool.dispatch(jobs.len(), &|i, slot| {
            let job = &jobs[i];
            let mut enc = encoders[slot].lock().unwrap();
            let mut result = results[i].lock().unwrap();
            let reference = job.delta_ok.then_some(prev);
            enc.encode_into(cur, job.x, job.y, job.w, job.h, reference, &mut result);
        });

        // Steps 8-10: batch, footer, send, commit.
        let tiles = self.jobs.len();
        self.stream_batches(cur, &scrolls)?;
        for job in &self.jobs {
            self.prev.copy_tile_from(cur, job.x, job.y, job.w, job.h);
        }
        trace!(
            "frame sent: {} tiles, {} scrolls, full={}",
            tiles,
            scrolls.len(),
            send_full
        );
        Ok(tiles)
    }

    /// Assemble and send the command batches for one frame: scroll
    /// prefix, tile loads, footer. No header or payload is ever split
    /// across batches.
    fn stream_batches(&mut self, cur: &FrameBuffer, scrolls: &[ScrollRegion]) -> Result<()> {
        let max_batch = self.transport.max_batch();
        let fid = self.resources.data_fid();
        let main = self.resources.main_id();
        let delta = self.resources.delta_id();
        let mask = self.resources.mask_id();
        let mut batch = BytesMut::with_capacity(max_batch);

        for s in scrolls {
            let r = s.rect;
            let dst = Rect::new(
                r.min_x + s.dx.max(0),
                r.min_y + s.dy.max(0),
                r.max_x + s.dx.min(0),
                r.max_y + s.dy.min(0),
            );
            if dst.is_empty() {
                continue;
            }
            self.reserve(&mut batch, wire::COMPOSITE_LEN, max_batch, fid)?;
            wire::composite(
                &mut batch,
                main,
                main,
                mask,
                dst,
                Point::new(dst.min_x - s.dx, dst.min_y - s.dy),
                Point::new(0, 0),
            );
        }

        for i in 0..self.jobs.len() {
            let job = &self.jobs[i];
            let result = self.results[i].lock().unwrap();
            let r = Rect::new(
                job.x as i32,
                job.y as i32,
                (job.x + job.w) as i32,
                (job.y + job.h) as i32,
            );
            self.reserve(&mut batch, result.batch_cost(), max_batch, fid)?;
            match result.tag {
                TileTag::Direct => {
                    wire::load_compressed_header(&mut batch, main, r);
                    batch.put_slice(&result.data);
                }
                TileTag::Raw => {
                    wire::load_header(&mut batch, main, r);
                    batch.put_slice(&result.data);
                }
                TileTag::Delta => {
                    wire::load_compressed_header(&mut batch, delta, r);
                    batch.put_slice(&result.data);
                    // The composite consuming the delta image stays in
                    // the same batch as the load that produced it.
                    wire::composite(
                        &mut batch,
                        main,
                        delta,
                        delta,
                        r,
                        Point::new(r.min_x, r.min_y),
                        Point::new(r.min_x, r.min_y),
                    );
                }
            }
        }

        // Step 9: footer — screen blit, borders, display flush.
        let borders = self.resources.border_rects();
        let footer = wire::COMPOSITE_LEN * (1 + borders.len()) + wire::FLUSH_LEN;
        self.reserve(&mut batch, footer, max_batch, fid)?;
        let win = self.resources.window_rect();
        let screen = self.resources.screen_id();
        let fill = self.resources.fill_id();
        wire::composite(
            &mut batch,
            screen,
            main,
            mask,
            Rect::new(
                win.min_x,
                win.min_y,
                win.min_x + cur.width() as i32,
                win.min_y + cur.height() as i32,
            ),
            Point::new(0, 0),
            Point::new(0, 0),
        );
        for b in borders {
            wire::composite(&mut batch, screen, fill, mask, b, Point::new(0, 0), Point::new(0, 0));
        }
        wire::flush(&mut batch);
        self.flush_batch(&mut batch, fid)?;
        Ok(())
    }

    /// Flush the in-progress batch when `need` more bytes would overflow
    /// the atomic-write unit.
    fn reserve(&self, batch: &mut BytesMut, need: usize, max_batch: usize, fid: u32) -> Result<()> {
        if batch.len() + need > max_batch {
            self.flush_batch(batch, fid)?;
        }
        Ok(())
    }

    fn flush_batch(&self, batch: &mut BytesMut, fid: u32) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.drain.throttle(self.opts.throttle_depth);
        if !self.drain.is_running() {
            return Err(Error::Protocol("drain stopped mid-frame".into()));
        }
        self.transport.write_pipelined(fid, 0, batch)?;
        self.drain.notify();
        batch.clear();
        Ok(())
    }

    fn shutdown(self) {
        self.shared.running.store(false, Ordering::Release);
        {
            let mut st = self.shared.frame.lock().unwrap();
            st.shutdown = true;
        }
        // Join the drain (consuming the replies still owed), then free
        // the remote images synchronously on the now-quiet stream.
        let SendCtx {
            drain,
            mut resources,
            ..
        } = self;
        drain.stop();
        if let Err(e) = resources.release() {
            debug!("release on shutdown failed: {e}");
        }
        info!("send thread stopped");
    }
}

impl Shared {
    fn force_full_now(&self) {
        let mut st = self.frame.lock().unwrap();
        st.send_full = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_picking_implements_back_pressure() {
        let mut st = FrameState::new(64, 64);
        assert_eq!(st.pick_slot(), Some(0));
        st.pending = Some(0);
        assert_eq!(st.pick_slot(), Some(1));
        st.active = Some(1);
        assert_eq!(st.pick_slot(), None); // third frame drops
        st.pending = None;
        assert_eq!(st.pick_slot(), Some(0));
    }

    #[test]
    fn resize_clears_rotation_state() {
        let mut st = FrameState::new(64, 64);
        st.pending = Some(1);
        st.active = Some(0);
        st.dirty_valid = [true, true];
        st.resize(128, 96);
        assert_eq!(st.pending, None);
        assert_eq!(st.active, None);
        assert!(st.send_full);
        assert_eq!(st.framebuf.width(), 128);
        assert_eq!(st.send_buf[1].height(), 96);
        assert_eq!(st.dirty[0].tiles_x(), 8);
        assert!(!st.dirty_valid[0]);
    }

    #[test]
    fn default_options_are_sane() {
        let opts = CoreOptions::default();
        assert_eq!(opts.workers, 0);
        assert!(opts.detect_scroll);
        assert_eq!(opts.throttle_depth, 2);
    }
}
