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

//! Scroll detection by phase correlation.
//!
//! The frame is partitioned into analysis regions of side
//! [`SCROLL_REGION_SIZE`]. Inside each region a power-of-two sampling
//! window, inset one tile from the frame edges, is extracted from the
//! current frame and the previous-frame reference, Hann-windowed, and
//! phase-correlated: the peak of the inverse FFT of the normalized
//! cross-power spectrum gives the candidate displacement.
//!
//! A candidate is only *confirmed* by measuring compression cost over the
//! region's tiles with and without the shift; the shift must save at
//! least 5%. Confirmed scrolls are applied to the previous-frame
//! reference in place, with the exposed tile-aligned band filled with the
//! sentinel so the following diff retransmits it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{debug, trace};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::compress::TileEncoder;
use crate::frame::FrameBuffer;
use crate::pool::WorkerPool;
use crate::{Rect, SENTINEL, TILE_SIZE};

/// Side length of one analysis region, in pixels.
pub const SCROLL_REGION_SIZE: usize = 256;

/// Displacements smaller than this in both axes are treated as noise.
pub const MIN_SCROLL_PIXELS: i32 = 8;

/// Smallest usable analysis window; regions that cannot fit one are
/// skipped.
const MIN_ANALYSIS: usize = 64;

/// One analysis region and its candidate displacement.
#[derive(Debug, Clone)]
pub struct ScrollRegion {
    /// Tile-aligned rectangle the scroll applies to.
    pub rect: Rect,
    pub dx: i32,
    pub dy: i32,
    /// Whether phase correlation produced an acceptable peak.
    pub detected: bool,
}

struct Plans {
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    hann: Arc<Vec<f32>>,
}

/// Phase-correlation scroll detector with cached FFT plans.
pub struct ScrollDetector {
    planner: FftPlanner<f32>,
    plans: HashMap<usize, Arc<Plans>>,
}

impl ScrollDetector {
    pub fn new() -> Self {
        ScrollDetector {
            planner: FftPlanner::new(),
            plans: HashMap::new(),
        }
    }

    fn plans_for(&mut self, n: usize) -> Arc<Plans> {
        let planner = &mut self.planner;
        Arc::clone(self.plans.entry(n).or_insert_with(|| {
            let hann: Vec<f32> = (0..n)
                .map(|i| {
                    0.5 * (1.0
                        - (2.0 * std::f32::consts::PI * i as f32 / (n - 1) as f32).cos())
                })
                .collect();
            Arc::new(Plans {
                forward: planner.plan_fft_forward(n),
                inverse: planner.plan_fft_inverse(n),
                hann: Arc::new(hann),
            })
        }))
    }

    /// Run phase correlation over every region, in parallel across the
    /// worker pool. Returns one entry per region; `detected` marks the
    /// ones with a candidate displacement.
    pub fn detect(
        &mut self,
        cur: &FrameBuffer,
        prev: &FrameBuffer,
        pool: &WorkerPool,
    ) -> Vec<ScrollRegion> {
        let width = cur.width();
        let height = cur.height();
        let mut regions = Vec::new();
        let mut windows = Vec::new();
        for ry in (0..height).step_by(SCROLL_REGION_SIZE) {
            for rx in (0..width).step_by(SCROLL_REGION_SIZE) {
                let rect = Rect::new(
                    rx as i32,
                    ry as i32,
                    (rx + SCROLL_REGION_SIZE).min(width) as i32,
                    (ry + SCROLL_REGION_SIZE).min(height) as i32,
                );
                regions.push(ScrollRegion {
                    rect: tile_align(rect, width, height),
                    dx: 0,
                    dy: 0,
                    detected: false,
                });
                windows.push(analysis_window(rect, width, height));
            }
        }
        // Plan every window size up front so the parallel jobs only read.
        for win in windows.iter().flatten() {
            self.plans_for(win.2);
        }
        let plans = &self.plans;
        let slots: Vec<Mutex<&mut ScrollRegion>> =
            regions.iter_mut().map(Mutex::new).collect();
        pool.dispatch(slots.len(), &|i, _slot| {
            let Some((wx, wy, n)) = windows[i] else {
                return;
            };
            let plans = &plans[&n];
            if let Some((dx, dy)) = correlate(cur, prev, wx, wy, n, plans) {
                let mut region = slots[i].lock().unwrap();
                region.dx = dx;
                region.dy = dy;
                region.detected = true;
                trace!(
                    "scroll candidate ({dx},{dy}) in region {:?}",
                    region.rect
                );
            }
        });
        drop(slots);
        regions
    }
}

impl Default for ScrollDetector {
    fn default() -> Self {
        ScrollDetector::new()
    }
}

/// Align a rectangle outward to tile boundaries, clamped to the frame.
fn tile_align(r: Rect, width: usize, height: usize) -> Rect {
    let t = TILE_SIZE as i32;
    Rect::new(
        r.min_x / t * t,
        r.min_y / t * t,
        ((r.max_x + t - 1) / t * t).min(width as i32),
        ((r.max_y + t - 1) / t * t).min(height as i32),
    )
}

/// Pick the sampling window for a region: inset one tile from the frame
/// edges, then the largest power of two that fits, centered. Returns
/// `(x, y, side)`.
fn analysis_window(region: Rect, width: usize, height: usize) -> Option<(usize, usize, usize)> {
    let t = TILE_SIZE as i32;
    let x0 = region.min_x.max(t);
    let y0 = region.min_y.max(t);
    let x1 = region.max_x.min(width as i32 - t);
    let y1 = region.max_y.min(height as i32 - t);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    let avail = ((x1 - x0).min(y1 - y0)) as usize;
    if avail < MIN_ANALYSIS {
        return None;
    }
    let side = prev_power_of_two(avail);
    let x = x0 as usize + ((x1 - x0) as usize - side) / 2;
    let y = y0 as usize + ((y1 - y0) as usize - side) / 2;
    Some((x, y, side))
}

fn prev_power_of_two(n: usize) -> usize {
    let mut p = 1;
    while p * 2 <= n {
        p *= 2;
    }
    p
}

#[inline]
fn gray(px: u32) -> f32 {
    ((px >> 16 & 0xFF) + (px >> 8 & 0xFF) + (px & 0xFF)) as f32
}

fn load_windowed(
    fb: &FrameBuffer,
    x: usize,
    y: usize,
    n: usize,
    hann: &[f32],
    out: &mut Vec<Complex<f32>>,
) {
    out.clear();
    out.reserve(n * n);
    for j in 0..n {
        let wy = hann[j];
        let row = &fb.row(y + j)[x..x + n];
        for (i, &px) in row.iter().enumerate() {
            out.push(Complex::new(gray(px) * wy * hann[i], 0.0));
        }
    }
}

fn transpose(data: &mut Vec<Complex<f32>>, n: usize, scratch: &mut Vec<Complex<f32>>) {
    scratch.clear();
    scratch.resize(n * n, Complex::new(0.0, 0.0));
    for j in 0..n {
        for i in 0..n {
            scratch[i * n + j] = data[j * n + i];
        }
    }
    std::mem::swap(data, scratch);
}

fn fft_2d(data: &mut Vec<Complex<f32>>, n: usize, fft: &Arc<dyn Fft<f32>>, scratch: &mut Vec<Complex<f32>>) {
    fft.process(data); // all rows
    transpose(data, n, scratch);
    fft.process(data); // all columns
    transpose(data, n, scratch);
}

/// Map a peak index to a signed displacement modulo `n`.
#[inline]
fn signed_mod(i: usize, n: usize) -> i32 {
    if i > n / 2 {
        i as i32 - n as i32
    } else {
        i as i32
    }
}

/// Phase-correlate the `n x n` windows of both frames at `(x, y)`.
fn correlate(
    cur: &FrameBuffer,
    prev: &FrameBuffer,
    x: usize,
    y: usize,
    n: usize,
    plans: &Plans,
) -> Option<(i32, i32)> {
    let mut a = Vec::new();
    let mut b = Vec::new();
    let mut scratch = Vec::new();
    load_windowed(prev, x, y, n, &plans.hann, &mut a);
    load_windowed(cur, x, y, n, &plans.hann, &mut b);
    fft_2d(&mut a, n, &plans.forward, &mut scratch);
    fft_2d(&mut b, n, &plans.forward, &mut scratch);
    // Normalized cross-power spectrum in place over `a`.
    for (av, bv) in a.iter_mut().zip(b.iter()) {
        let c = av.conj() * bv;
        let mag = c.norm();
        *av = if mag > 1e-9 { c / mag } else { Complex::new(0.0, 0.0) };
    }
    fft_2d(&mut a, n, &plans.inverse, &mut scratch);
    let (mut peak_i, mut peak) = (0usize, f32::MIN);
    for (i, v) in a.iter().enumerate() {
        if v.re > peak {
            peak = v.re;
            peak_i = i;
        }
    }
    let dx = signed_mod(peak_i % n, n);
    let dy = signed_mod(peak_i / n, n);
    if dx.abs() < MIN_SCROLL_PIXELS && dy.abs() < MIN_SCROLL_PIXELS {
        return None;
    }
    if dx.unsigned_abs() as usize >= n || dy.unsigned_abs() as usize >= n {
        return None;
    }
    Some((dx, dy))
}

/// Compression-cost verification: confirm the candidate only when
/// sending the region with the shift is at least 5% cheaper than
/// without it.
pub fn verify(
    cur: &FrameBuffer,
    prev: &FrameBuffer,
    region: &ScrollRegion,
    enc: &mut TileEncoder,
) -> bool {
    if !region.detected {
        return false;
    }
    let r = region.rect;
    if region.dx.abs() >= r.width() || region.dy.abs() >= r.height() {
        return false;
    }
    let width = cur.width() as i32;
    let height = cur.height() as i32;
    let t = TILE_SIZE as i32;
    let mut bytes_no_scroll: u64 = 0;
    let mut bytes_with_scroll: u64 = 0;
    let mut ty = r.min_y;
    while ty + t <= r.max_y {
        let mut tx = r.min_x;
        while tx + t <= r.max_x {
            let (x, y) = (tx as usize, ty as usize);
            bytes_no_scroll +=
                enc.tile_cost(cur, x, y, TILE_SIZE, TILE_SIZE, prev, x, y) as u64;
            let sx = tx - region.dx;
            let sy = ty - region.dy;
            if sx >= 0 && sy >= 0 && sx + t <= width && sy + t <= height {
                bytes_with_scroll += enc.tile_cost(
                    cur,
                    x,
                    y,
                    TILE_SIZE,
                    TILE_SIZE,
                    prev,
                    sx as usize,
                    sy as usize,
                ) as u64;
            } else {
                // Shifted source falls off the buffer: charge a raw tile.
                bytes_with_scroll += (TILE_SIZE * TILE_SIZE * 4) as u64;
            }
            tx += t;
        }
        ty += t;
    }
    let ok = bytes_with_scroll * 20 < bytes_no_scroll * 19;
    debug!(
        "scroll ({}, {}) over {:?}: {} vs {} bytes -> {}",
        region.dx,
        region.dy,
        r,
        bytes_with_scroll,
        bytes_no_scroll,
        if ok { "confirmed" } else { "rejected" }
    );
    ok
}

/// Apply a confirmed scroll to the previous-frame reference: shift the
/// region rectangle by the displacement and sentinel-fill the exposed
/// band, widened to tile alignment.
pub fn apply(prev: &mut FrameBuffer, region: &ScrollRegion) {
    let r = region.rect;
    let (dx, dy) = (region.dx, region.dy);
    prev.scroll_rect(r, dx, dy, SENTINEL);
    let t = TILE_SIZE as i32;
    let up = |v: i32| (v + t - 1) / t * t;
    if dy > 0 {
        prev.fill_rect(Rect::new(r.min_x, r.min_y, r.max_x, r.min_y + up(dy)), SENTINEL);
    } else if dy < 0 {
        prev.fill_rect(Rect::new(r.min_x, r.max_y - up(-dy), r.max_x, r.max_y), SENTINEL);
    }
    if dx > 0 {
        prev.fill_rect(Rect::new(r.min_x, r.min_y, r.min_x + up(dx), r.max_y), SENTINEL);
    } else if dx < 0 {
        prev.fill_rect(Rect::new(r.max_x - up(-dx), r.min_y, r.max_x, r.max_y), SENTINEL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic busy pattern with strong autocorrelation structure.
    fn patterned(width: usize, height: usize) -> FrameBuffer {
        let mut fb = FrameBuffer::new(width, height);
        let mut state = 0x1234_5678u32;
        for y in 0..height {
            for x in 0..width {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                fb.put_pixel(x, y, state >> 8 & 0x00FF_FFFF);
            }
        }
        fb
    }

    fn shifted_down(src: &FrameBuffer, dy: usize) -> FrameBuffer {
        let mut out = FrameBuffer::new(src.width(), src.height());
        for y in dy..src.height() {
            let w = src.width();
            let (src_row, out_row) = (src.row(y - dy).to_vec(), y);
            out.row_mut(out_row)[..w].copy_from_slice(&src_row);
        }
        out
    }

    #[test]
    fn identical_frames_yield_no_candidates() {
        let prev = patterned(256, 256);
        let cur = prev.clone();
        let pool = WorkerPool::new(2);
        let mut det = ScrollDetector::new();
        let regions = det.detect(&cur, &prev, &pool);
        assert!(!regions.is_empty());
        assert!(regions.iter().all(|r| !r.detected));
    }

    #[test]
    fn vertical_shift_is_detected_and_confirmed() {
        let prev = patterned(256, 256);
        let cur = shifted_down(&prev, 16);
        let pool = WorkerPool::new(2);
        let mut det = ScrollDetector::new();
        let regions = det.detect(&cur, &prev, &pool);
        let hit = regions.iter().find(|r| r.detected).expect("no candidate");
        assert_eq!((hit.dx, hit.dy), (0, 16));

        let mut enc = TileEncoder::new();
        assert!(verify(&cur, &prev, hit, &mut enc));

        let mut reference = prev.clone();
        apply(&mut reference, hit);
        // Below the exposed band the reference now matches the frame.
        for ty in (16..256).step_by(16) {
            for tx in (0..256).step_by(16) {
                assert!(
                    cur.tile_equal(&reference, tx, ty, 16, 16),
                    "tile ({tx},{ty}) should match after scroll"
                );
            }
        }
        // The exposed band is sentinel-marked.
        assert!(reference.perimeter_contains(0, 0, 16, 16, SENTINEL));
    }

    #[test]
    fn noisy_shift_is_rejected_by_cost() {
        let prev = patterned(256, 256);
        let mut cur = shifted_down(&prev, 16);
        // Perturb every pixel: the vector is still visible to phase
        // correlation but the shift no longer saves any bytes.
        for y in 0..256 {
            for x in 0..256 {
                let v = cur.pixel(x, y);
                cur.put_pixel(x, y, v ^ 1);
            }
        }
        let pool = WorkerPool::new(2);
        let mut det = ScrollDetector::new();
        let regions = det.detect(&cur, &prev, &pool);
        let mut enc = TileEncoder::new();
        for r in regions.iter().filter(|r| r.detected) {
            assert!(!verify(&cur, &prev, r, &mut enc));
        }
    }

    #[test]
    fn displacement_as_large_as_the_region_is_rejected() {
        let cur = patterned(128, 128);
        let prev = patterned(128, 128);
        let region = ScrollRegion {
            rect: Rect::new(0, 0, 128, 128),
            dx: 0,
            dy: 128,
            detected: true,
        };
        let mut enc = TileEncoder::new();
        assert!(!verify(&cur, &prev, &region, &mut enc));
    }

    #[test]
    fn small_frames_skip_analysis() {
        let cur = patterned(96, 96);
        let prev = patterned(96, 96);
        let pool = WorkerPool::new(1);
        let mut det = ScrollDetector::new();
        // 96 - 2*16 = 64 available: exactly the floor, so analysis runs.
        let regions = det.detect(&cur, &prev, &pool);
        assert_eq!(regions.len(), 1);
        let tiny_prev = patterned(64, 64);
        let tiny_cur = patterned(64, 64);
        let regions = det.detect(&tiny_cur, &tiny_prev, &pool);
        // 64 - 32 = 32 < MIN_ANALYSIS: nothing detectable.
        assert!(regions.iter().all(|r| !r.detected));
    }
}
