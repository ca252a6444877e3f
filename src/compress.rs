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

//! Tile compressor.
//!
//! Compresses the raw bytes of one tile (`h` rows of `bytes_per_row`
//! bytes) into a token stream of two kinds:
//!
//! - *Literal run*: control byte `0x80 | (count-1)`, count 1..=128,
//!   followed by `count` literal bytes.
//! - *Back-reference*: two bytes packing `length` 3..=34 and `offset`
//!   1..=1024 as `((length-3) << 2) | ((offset-1) >> 8)` then
//!   `(offset-1) & 0xFF`.
//!
//! Solid tiles (every pixel equal to the first, including the all-zero
//! tile) take a fast path: a four-byte literal, then back-references
//! filling the first row and replicating it down the tile. A row equal to
//! its predecessor is emitted as whole-row back-references without hash
//! lookups.
//!
//! Matching uses a per-worker hash table keyed by a 3-byte hash, holding
//! the most recent position seen, plus an always-tried match against the
//! position one row above. The table carries a generation counter so it
//! invalidates without a memset between tiles.
//!
//! A compressed output is accepted only if it is at most 75% of the raw
//! size; otherwise the encoder reports 0 and the caller falls back to a
//! raw load. On top of the byte compressor sit the three tile encodings
//! (direct, alpha-delta, raw) and the adaptive selector.

use crate::frame::FrameBuffer;
use crate::TILE_SIZE;

/// Worst-case encoded size of one tile result buffer.
pub const MAX_TILE_RESULT: usize = TILE_SIZE * TILE_SIZE * 4 + 256;

/// Byte overhead of the composite command a delta tile requires after its
/// load; the adaptive selector charges this against the delta encoding.
pub const DELTA_DRAW_OVERHEAD: usize = 45;

const MIN_MATCH: usize = 3;
const MAX_MATCH: usize = 34;
const MAX_OFFSET: usize = 1024;
const MAX_LITERAL_RUN: usize = 128;

const HASH_BITS: u32 = 12;
const HASH_SIZE: usize = 1 << HASH_BITS;

/// Fraction of changed pixels above which the delta encoding is rejected
/// in favor of direct (numerator/denominator of 3/4).
const DELTA_CHANGE_NUM: usize = 3;
const DELTA_CHANGE_DEN: usize = 4;

#[inline]
fn hash3(data: &[u8], pos: usize) -> usize {
    let v = u32::from(data[pos])
        | u32::from(data[pos + 1]) << 8
        | u32::from(data[pos + 2]) << 16;
    (v.wrapping_mul(0x9E37_79B1) >> (32 - HASH_BITS)) as usize
}

/// Per-worker match-table scratch. Reset between tiles by bumping the
/// generation; the position array is never cleared, and the generation
/// array only on counter overflow.
pub struct Scratch {
    head: Vec<u32>,
    gen: Vec<u32>,
    current: u32,
}

impl Scratch {
    pub fn new() -> Self {
        Scratch {
            head: vec![0; HASH_SIZE],
            gen: vec![0; HASH_SIZE],
            current: 0,
        }
    }

    /// Invalidate every entry.
    fn begin(&mut self) {
        self.current = self.current.wrapping_add(1);
        if self.current == 0 {
            self.gen.fill(0);
            self.current = 1;
        }
    }

    #[inline]
    fn get(&self, h: usize) -> Option<usize> {
        if self.gen[h] == self.current {
            Some(self.head[h] as usize)
        } else {
            None
        }
    }

    #[inline]
    fn put(&mut self, h: usize, pos: usize) {
        self.head[h] = pos as u32;
        self.gen[h] = self.current;
    }
}

impl Default for Scratch {
    fn default() -> Self {
        Scratch::new()
    }
}

/// Output cursor that refuses to grow past its acceptance limit.
struct Sink<'a> {
    out: &'a mut [u8],
    len: usize,
    limit: usize,
}

impl<'a> Sink<'a> {
    fn new(out: &'a mut [u8], limit: usize) -> Self {
        let limit = limit.min(out.len());
        Sink { out, len: 0, limit }
    }

    #[inline]
    fn push(&mut self, b: u8) -> bool {
        if self.len >= self.limit {
            return false;
        }
        self.out[self.len] = b;
        self.len += 1;
        true
    }

    fn push_slice(&mut self, s: &[u8]) -> bool {
        if self.len + s.len() > self.limit {
            return false;
        }
        self.out[self.len..self.len + s.len()].copy_from_slice(s);
        self.len += s.len();
        true
    }
}

#[inline]
fn emit_backref(sink: &mut Sink, len: usize, offset: usize) -> bool {
    debug_assert!((MIN_MATCH..=MAX_MATCH).contains(&len));
    debug_assert!((1..=MAX_OFFSET).contains(&offset));
    let off = offset - 1;
    sink.push((((len - MIN_MATCH) << 2) | (off >> 8)) as u8) && sink.push((off & 0xFF) as u8)
}

fn emit_literals(sink: &mut Sink, data: &[u8]) -> bool {
    for chunk in data.chunks(MAX_LITERAL_RUN) {
        if !sink.push((0x80 | (chunk.len() - 1)) as u8) || !sink.push_slice(chunk) {
            return false;
        }
    }
    true
}

/// Cover `total` bytes with back-references at a fixed `offset`, keeping
/// every piece at least `MIN_MATCH` long.
fn emit_span(sink: &mut Sink, mut total: usize, offset: usize) -> bool {
    while total > 0 {
        let mut take = total.min(MAX_MATCH);
        let rem = total - take;
        if rem > 0 && rem < MIN_MATCH {
            take = total - MIN_MATCH;
        }
        if !emit_backref(sink, take, offset) {
            return false;
        }
        total -= take;
    }
    true
}

fn encode_solid(src: &[u8], bytes_per_row: usize, sink: &mut Sink) -> usize {
    if !emit_literals(sink, &src[..4]) {
        return 0;
    }
    // Fill out the first row from the 4-byte pattern, then replicate the
    // row downward. Overlapping copies are well-defined for the decoder.
    if bytes_per_row > 4 && !emit_span(sink, bytes_per_row - 4, 4) {
        return 0;
    }
    if src.len() > bytes_per_row && !emit_span(sink, src.len() - bytes_per_row, bytes_per_row) {
        return 0;
    }
    sink.len
}

#[inline]
fn match_len(src: &[u8], a: usize, b: usize, max: usize) -> usize {
    let mut n = 0;
    while n < max && src[a + n] == src[b + n] {
        n += 1;
    }
    n
}

/// Compress `h` rows of `bytes_per_row` bytes into `out`.
///
/// Returns the encoded length, or 0 when the result would exceed 75% of
/// the raw size (or overflow `out`) and the caller should send raw bytes
/// instead.
pub fn compress(src: &[u8], bytes_per_row: usize, out: &mut [u8], scratch: &mut Scratch) -> usize {
    debug_assert!(bytes_per_row > 0 && src.len() % bytes_per_row == 0);
    scratch.begin();
    let raw = src.len();
    let mut sink = Sink::new(out, raw * 3 / 4);

    if raw >= 4 && raw % 4 == 0 {
        let first = &src[..4];
        if src.chunks_exact(4).all(|px| px == first) {
            return encode_solid(src, bytes_per_row, &mut sink);
        }
    }

    let row_ref_ok = bytes_per_row <= MAX_OFFSET;
    let mut pos = 0;
    let mut lit_start = 0;
    while pos < raw {
        // Whole-row fast path: a row identical to its predecessor goes
        // out as row-offset back-references with no table traffic.
        if row_ref_ok
            && pos >= bytes_per_row
            && pos % bytes_per_row == 0
            && pos + bytes_per_row <= raw
            && src[pos..pos + bytes_per_row] == src[pos - bytes_per_row..pos]
        {
            if !emit_literals(&mut sink, &src[lit_start..pos])
                || !emit_span(&mut sink, bytes_per_row, bytes_per_row)
            {
                return 0;
            }
            pos += bytes_per_row;
            lit_start = pos;
            continue;
        }

        let mut best_len = 0;
        let mut best_off = 0;
        if pos + MIN_MATCH <= raw {
            let max = (raw - pos).min(MAX_MATCH);
            let h = hash3(src, pos);
            if let Some(cand) = scratch.get(h) {
                if cand < pos && pos - cand <= MAX_OFFSET {
                    let len = match_len(src, cand, pos, max);
                    if len >= MIN_MATCH {
                        best_len = len;
                        best_off = pos - cand;
                    }
                }
            }
            // The pixel directly above is always worth a try.
            if row_ref_ok && pos >= bytes_per_row {
                let len = match_len(src, pos - bytes_per_row, pos, max);
                if len > best_len || (len == best_len && bytes_per_row < best_off) {
                    if len >= MIN_MATCH {
                        best_len = len;
                        best_off = bytes_per_row;
                    }
                }
            }
        }

        if best_len >= MIN_MATCH {
            if !emit_literals(&mut sink, &src[lit_start..pos])
                || !emit_backref(&mut sink, best_len, best_off)
            {
                return 0;
            }
            let end = pos + best_len;
            while pos < end {
                if pos + MIN_MATCH <= raw {
                    let h = hash3(src, pos);
                    scratch.put(h, pos);
                }
                pos += 1;
            }
            lit_start = pos;
        } else {
            if pos + MIN_MATCH <= raw {
                scratch.put(hash3(src, pos), pos);
            }
            pos += 1;
        }
    }

    if !emit_literals(&mut sink, &src[lit_start..raw]) {
        return 0;
    }
    sink.len
}

/// Extract the `w x h` tile at `(x, y)` as contiguous little-endian
/// XRGB32 bytes.
pub fn extract_tile(fb: &FrameBuffer, x: usize, y: usize, w: usize, h: usize, out: &mut Vec<u8>) {
    out.clear();
    out.reserve(w * h * 4);
    for row in y..y + h {
        for &px in &fb.row(row)[x..x + w] {
            out.extend_from_slice(&px.to_le_bytes());
        }
    }
}

/// Build the alpha-delta image for the tile at `(x, y)` of `cur`,
/// compared against `prev` at `(px, py)`: unchanged pixels (low 24 bits)
/// become fully transparent zeroes, changed pixels opaque
/// `0xFF000000 | color`. Returns the number of changed pixels.
pub fn build_delta(
    cur: &FrameBuffer,
    x: usize,
    y: usize,
    prev: &FrameBuffer,
    px: usize,
    py: usize,
    w: usize,
    h: usize,
    out: &mut Vec<u8>,
) -> usize {
    out.clear();
    out.reserve(w * h * 4);
    let mut changed = 0;
    for row in 0..h {
        let c = &cur.row(y + row)[x..x + w];
        let p = &prev.row(py + row)[px..px + w];
        for i in 0..w {
            if c[i] & 0x00FF_FFFF == p[i] & 0x00FF_FFFF {
                out.extend_from_slice(&[0, 0, 0, 0]);
            } else {
                out.extend_from_slice(&(0xFF00_0000 | (c[i] & 0x00FF_FFFF)).to_le_bytes());
                changed += 1;
            }
        }
    }
    changed
}

/// How a tile result is to be loaded remote-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileTag {
    /// Compressed XRGB32 bytes for the main image.
    Direct,
    /// Compressed ARGB32 bytes for the delta image, composited onto the
    /// main image afterwards.
    Delta,
    /// Uncompressed XRGB32 bytes for the main image.
    Raw,
}

/// One tile's encoded output.
#[derive(Debug)]
pub struct TileResult {
    pub tag: TileTag,
    pub data: Vec<u8>,
}

impl TileResult {
    pub fn new() -> Self {
        TileResult {
            tag: TileTag::Raw,
            data: Vec::with_capacity(MAX_TILE_RESULT),
        }
    }

    /// Bytes the tile will occupy in a batch, headers included.
    pub fn batch_cost(&self) -> usize {
        let mut cost = crate::wire::LOAD_HEADER_LEN + self.data.len();
        if self.tag == TileTag::Delta {
            cost += DELTA_DRAW_OVERHEAD;
        }
        cost
    }
}

impl Default for TileResult {
    fn default() -> Self {
        TileResult::new()
    }
}

/// Per-worker tile encoder: the match scratch plus reusable buffers for
/// extraction, delta construction and the two candidate encodings.
pub struct TileEncoder {
    scratch: Scratch,
    raw: Vec<u8>,
    delta: Vec<u8>,
    out_direct: Vec<u8>,
    out_delta: Vec<u8>,
}

impl TileEncoder {
    pub fn new() -> Self {
        TileEncoder {
            scratch: Scratch::new(),
            raw: Vec::with_capacity(MAX_TILE_RESULT),
            delta: Vec::with_capacity(MAX_TILE_RESULT),
            out_direct: vec![0; MAX_TILE_RESULT],
            out_delta: vec![0; MAX_TILE_RESULT],
        }
    }

    /// Candidate sizes for the tile at `(x, y)` against `prev` sampled at
    /// `(px, py)`. Returns `(direct, delta)`; either may be 0 when that
    /// encoding did not clear its bar.
    fn candidate_sizes(
        &mut self,
        cur: &FrameBuffer,
        x: usize,
        y: usize,
        w: usize,
        h: usize,
        prev: Option<(&FrameBuffer, usize, usize)>,
    ) -> (usize, usize) {
        extract_tile(cur, x, y, w, h, &mut self.raw);
        let direct = compress(&self.raw, w * 4, &mut self.out_direct, &mut self.scratch);

        let mut delta = 0;
        if let Some((pf, px, py)) = prev {
            let changed = build_delta(cur, x, y, pf, px, py, w, h, &mut self.delta);
            let total = w * h;
            if changed > 0 && changed * DELTA_CHANGE_DEN <= total * DELTA_CHANGE_NUM {
                delta = compress(&self.delta, w * 4, &mut self.out_delta, &mut self.scratch);
            }
        }
        (direct, delta)
    }

    /// Adaptive selection for the tile at `(x, y)`.
    ///
    /// Positive: the delta encoding was chosen, value is its size.
    /// Negative: direct was chosen, magnitude is its size. Zero: neither
    /// encoding cleared the 25% savings bar; send raw.
    pub fn adaptive_size(
        &mut self,
        cur: &FrameBuffer,
        x: usize,
        y: usize,
        w: usize,
        h: usize,
        prev: Option<(&FrameBuffer, usize, usize)>,
    ) -> isize {
        let (direct, delta) = self.candidate_sizes(cur, x, y, w, h, prev);
        match (direct, delta) {
            (0, 0) => 0,
            (d, 0) => -(d as isize),
            (0, e) => e as isize,
            (d, e) => {
                if e + DELTA_DRAW_OVERHEAD < d {
                    e as isize
                } else {
                    -(d as isize)
                }
            }
        }
    }

    /// Encode the tile at `(x, y)` into `result`, choosing adaptively.
    /// `prev` must only be supplied when the tile is delta-eligible.
    pub fn encode_into(
        &mut self,
        cur: &FrameBuffer,
        x: usize,
        y: usize,
        w: usize,
        h: usize,
        prev: Option<&FrameBuffer>,
        result: &mut TileResult,
    ) {
        let signed = self.adaptive_size(cur, x, y, w, h, prev.map(|p| (p, x, y)));
        result.data.clear();
        if signed > 0 {
            result.tag = TileTag::Delta;
            result.data.extend_from_slice(&self.out_delta[..signed as usize]);
        } else if signed < 0 {
            result.tag = TileTag::Direct;
            result.data.extend_from_slice(&self.out_direct[..(-signed) as usize]);
        } else {
            result.tag = TileTag::Raw;
            result.data.extend_from_slice(&self.raw);
        }
    }

    /// Transmission-cost estimate for the scroll verifier: 0 for a tile
    /// identical to its reference (it would not be sent at all),
    /// otherwise the adaptive size plus the delta draw overhead, or the
    /// raw size when neither encoding qualifies.
    pub fn tile_cost(
        &mut self,
        cur: &FrameBuffer,
        x: usize,
        y: usize,
        w: usize,
        h: usize,
        prev: &FrameBuffer,
        px: usize,
        py: usize,
    ) -> usize {
        let mut equal = true;
        for row in 0..h {
            if cur.row(y + row)[x..x + w] != prev.row(py + row)[px..px + w] {
                equal = false;
                break;
            }
        }
        if equal {
            return 0;
        }
        let signed = self.adaptive_size(cur, x, y, w, h, Some((prev, px, py)));
        if signed > 0 {
            signed as usize + DELTA_DRAW_OVERHEAD
        } else if signed < 0 {
            (-signed) as usize
        } else {
            w * h * 4
        }
    }
}

impl Default for TileEncoder {
    fn default() -> Self {
        TileEncoder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink_bytes(f: impl FnOnce(&mut Sink) -> bool) -> Vec<u8> {
        let mut buf = vec![0u8; 4096];
        let mut sink = Sink::new(&mut buf, 4096);
        assert!(f(&mut sink));
        let n = sink.len;
        buf.truncate(n);
        buf
    }

    #[test]
    fn literal_run_of_128_uses_control_ff() {
        let data: Vec<u8> = (0..128u32).map(|i| (i * 7 + 1) as u8).collect();
        let out = sink_bytes(|s| emit_literals(s, &data));
        assert_eq!(out[0], 0xFF);
        assert_eq!(out.len(), 129);
        assert_eq!(&out[1..], &data[..]);
    }

    #[test]
    fn literal_run_of_129_splits() {
        let data = vec![0xABu8; 129];
        let out = sink_bytes(|s| emit_literals(s, &data));
        assert_eq!(out[0], 0xFF);
        assert_eq!(out[129], 0x80); // second run: one byte
        assert_eq!(out.len(), 131);
    }

    #[test]
    fn max_backref_packs_length_and_offset() {
        let out = sink_bytes(|s| emit_backref(s, 34, 1024));
        assert_eq!(out, vec![0x7F, 0xFF]);
        let out = sink_bytes(|s| emit_backref(s, 3, 1));
        assert_eq!(out, vec![0x00, 0x00]);
    }

    #[test]
    fn span_never_leaves_short_tail() {
        // 36 = 34 + 2 would strand a 2-byte reference; expect 33 + 3.
        let out = sink_bytes(|s| emit_span(s, 36, 64));
        assert_eq!(out.len(), 4);
        assert_eq!(out[0] >> 2, 33 - MIN_MATCH as u8);
        assert_eq!(out[2] >> 2, 3 - MIN_MATCH as u8);
    }

    #[test]
    fn solid_tile_compresses_small_and_deterministic() {
        let src = {
            let mut v = Vec::new();
            for _ in 0..16 * 16 {
                v.extend_from_slice(&0x0012_3456u32.to_le_bytes());
            }
            v
        };
        let mut scratch = Scratch::new();
        let mut out_a = vec![0u8; MAX_TILE_RESULT];
        let mut out_b = vec![0u8; MAX_TILE_RESULT];
        let n_a = compress(&src, 64, &mut out_a, &mut scratch);
        let n_b = compress(&src, 64, &mut out_b, &mut scratch);
        assert!(n_a > 0);
        assert_eq!(n_a, n_b);
        assert_eq!(&out_a[..n_a], &out_b[..n_b]);
        assert!(n_a * 4 <= src.len() * 3);
        assert_eq!(out_a[0], 0x83); // four-byte literal
    }

    #[test]
    fn incompressible_data_reports_zero() {
        // No 3-byte repeats anywhere: the output would be all literals
        // plus control bytes, over the 75% bar.
        let src: Vec<u8> = (0..256u32)
            .flat_map(|i| (i.wrapping_mul(0x01F3_5A7D) ^ 0xA5A5_1234).to_le_bytes())
            .collect();
        let mut scratch = Scratch::new();
        let mut out = vec![0u8; MAX_TILE_RESULT * 4];
        assert_eq!(compress(&src, 64, &mut out, &mut scratch), 0);
    }

    #[test]
    fn repeated_rows_compress_via_row_references() {
        let row: Vec<u8> = (0..64u32).map(|i| (i ^ (i << 3)) as u8).collect();
        let mut src = Vec::new();
        for _ in 0..16 {
            src.extend_from_slice(&row);
        }
        let mut scratch = Scratch::new();
        let mut out = vec![0u8; MAX_TILE_RESULT];
        let n = compress(&src, 64, &mut out, &mut scratch);
        assert!(n > 0);
        // First row is literals at worst (65 bytes); each later row costs
        // two back-references (64 = 34 + 30).
        assert!(n <= 65 + 15 * 4, "n = {}", n);
    }

    #[test]
    fn scratch_generation_survives_reuse() {
        let mut scratch = Scratch::new();
        let src_a = vec![7u8; 256];
        let src_b: Vec<u8> = (0..256u32)
            .flat_map(|i| (i.wrapping_mul(0x9E37_79B1)).to_le_bytes())
            .collect();
        let mut out = vec![0u8; MAX_TILE_RESULT * 4];
        for _ in 0..3 {
            assert!(compress(&src_a, 64, &mut out, &mut scratch) > 0);
            compress(&src_b[..256], 64, &mut out, &mut scratch);
        }
    }

    #[test]
    fn delta_counts_changed_pixels() {
        let mut cur = FrameBuffer::new(32, 32);
        let prev = FrameBuffer::new(32, 32);
        cur.put_pixel(17, 9, 0x00FF_FFFF);
        let mut out = Vec::new();
        let changed = build_delta(&cur, 16, 0, &prev, 16, 0, 16, 16, &mut out);
        assert_eq!(changed, 1);
        assert_eq!(out.len(), 16 * 16 * 4);
        // pixel (17,9) is at tile-local (1,9)
        let off = (9 * 16 + 1) * 4;
        assert_eq!(&out[off..off + 4], &0xFFFF_FFFFu32.to_le_bytes());
        assert_eq!(&out[..4], &[0, 0, 0, 0]);
    }

    #[test]
    fn delta_ignores_padding_byte() {
        let mut cur = FrameBuffer::new(16, 16);
        let mut prev = FrameBuffer::new(16, 16);
        cur.put_pixel(0, 0, 0x7700_1122);
        prev.put_pixel(0, 0, 0x0000_1122);
        let mut out = Vec::new();
        assert_eq!(build_delta(&cur, 0, 0, &prev, 0, 0, 16, 16, &mut out), 0);
    }

    #[test]
    fn adaptive_sign_matches_choice() {
        let mut enc = TileEncoder::new();

        // Identical solid tiles: delta sees zero changed pixels, direct
        // compresses well; expect a direct (negative) result.
        let solid = {
            let mut fb = FrameBuffer::new(16, 16);
            fb.fill(0x0011_2233);
            fb
        };
        let s = enc.adaptive_size(&solid, 0, 0, 16, 16, Some((&solid, 0, 0)));
        assert!(s < 0, "expected direct, got {}", s);

        // One changed pixel: the delta image is almost all zeroes and
        // beats direct even after the draw overhead when the tile content
        // itself is busy.
        let mut prev = FrameBuffer::new(16, 16);
        let mut cur = FrameBuffer::new(16, 16);
        for y in 0..16 {
            for x in 0..16 {
                let v = ((x * 31 + y * 17) as u32) * 0x0001_0101 & 0x00FF_FFFF;
                prev.put_pixel(x, y, v);
                cur.put_pixel(x, y, v);
            }
        }
        cur.put_pixel(3, 4, 0x00FF_FFFF);
        let s = enc.adaptive_size(&cur, 0, 0, 16, 16, Some((&prev, 0, 0)));
        assert!(s > 0, "expected delta, got {}", s);

        let mut result = TileResult::new();
        enc.encode_into(&cur, 0, 0, 16, 16, Some(&prev), &mut result);
        assert_eq!(result.tag, TileTag::Delta);
        assert_eq!(result.data.len(), s as usize);
    }

    #[test]
    fn adaptive_never_exceeds_75_percent() {
        let mut enc = TileEncoder::new();
        let mut cur = FrameBuffer::new(16, 16);
        for y in 0..16 {
            for x in 0..16 {
                cur.put_pixel(x, y, ((x + y * 16) as u32).wrapping_mul(0x01F3_5A7D));
            }
        }
        let s = enc.adaptive_size(&cur, 0, 0, 16, 16, None);
        let raw = 16 * 16 * 4;
        assert!(s.unsigned_abs() * 4 <= raw * 3, "s = {}", s);
    }

    #[test]
    fn tile_cost_is_zero_for_identical_tiles() {
        let mut enc = TileEncoder::new();
        let mut fb = FrameBuffer::new(32, 32);
        for y in 0..32 {
            for x in 0..32 {
                fb.put_pixel(x, y, ((x * y) as u32).wrapping_mul(0x0101_0101));
            }
        }
        assert_eq!(enc.tile_cost(&fb, 16, 16, 16, 16, &fb, 16, 16), 0);
        // Shifted sampling of different content must cost something.
        assert!(enc.tile_cost(&fb, 16, 16, 16, 16, &fb, 0, 0) > 0);
    }

    #[test]
    fn edge_tile_sizes_compress() {
        let mut fb = FrameBuffer::new(21, 23);
        fb.fill(0x0044_5566);
        let mut enc = TileEncoder::new();
        let mut result = TileResult::new();
        // Bottom-right edge tile: 5 x 7.
        enc.encode_into(&fb, 16, 16, 5, 7, None, &mut result);
        assert_eq!(result.tag, TileTag::Direct);
        assert!(result.data.len() * 4 <= 5 * 7 * 4 * 3);
    }
}
