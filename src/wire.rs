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

//! Draw-command codec.
//!
//! Commands are fixed-layout records: a single-byte opcode followed by
//! little-endian argument blocks. Each emitter appends one record to the
//! caller's buffer and returns the byte count.
//!
//! | Record            | Opcode | Length | Arguments                                             |
//! |-------------------|--------|-------:|-------------------------------------------------------|
//! | composite         | `d`    | 45     | `dst[4] src[4] mask[4] r[16] srcpt[8] maskpt[8]`       |
//! | allocate image    | `b`    | 55     | `id[4] screen[4] back[4] refresh[1] chan[4] repl[1] r[16] clip[16] color[4]` |
//! | free image        | `f`    | 5      | `id[4]`                                                |
//! | bind name         | `n`    | 6+n    | `id[4] len[1] name[n]`                                 |
//! | flush             | `v`    | 1      |                                                        |
//! | load raw          | `y`    | 21     | `id[4] r[16]`, followed by `w*h*4` pixel bytes          |
//! | load compressed   | `Y`    | 21     | `id[4] r[16]`, followed by the compressed stream        |
//!
//! Rectangles are four `i32` coordinates `(min_x, min_y, max_x, max_y)`;
//! points are two. Replicated images declare an effectively infinite clip
//! rectangle with bounds of magnitude [`REPL_CLIP_BOUND`].

use bytes::{BufMut, BytesMut};

use crate::{Point, Rect};

pub const OP_COMPOSITE: u8 = b'd';
pub const OP_ALLOC: u8 = b'b';
pub const OP_FREE: u8 = b'f';
pub const OP_NAME: u8 = b'n';
pub const OP_FLUSH: u8 = b'v';
pub const OP_LOAD: u8 = b'y';
pub const OP_LOAD_COMPRESSED: u8 = b'Y';

/// Record lengths, normative for batch budgeting.
pub const COMPOSITE_LEN: usize = 45;
pub const ALLOC_LEN: usize = 55;
pub const FREE_LEN: usize = 5;
pub const FLUSH_LEN: usize = 1;
pub const LOAD_HEADER_LEN: usize = 21;

/// Clip-bound magnitude declaring a replicated (tiling) image.
pub const REPL_CLIP_BOUND: i32 = 0x3FFF_FFFF;

// Channel kinds for the packed descriptor, one byte per channel,
// `kind << 4 | depth`, most significant channel first.
const KIND_RED: u32 = 0;
const KIND_GREEN: u32 = 1;
const KIND_BLUE: u32 = 2;
const KIND_GREY: u32 = 3;
const KIND_ALPHA: u32 = 4;
const KIND_IGNORE: u32 = 6;

const fn chan1(kind: u32, depth: u32) -> u32 {
    kind << 4 | depth
}

const fn chan4(a: u32, b: u32, c: u32, d: u32) -> u32 {
    a << 24 | b << 16 | c << 8 | d
}

/// 32-bit pixels, padding byte ignored.
pub const CHAN_XRGB32: u32 = chan4(
    chan1(KIND_IGNORE, 8),
    chan1(KIND_RED, 8),
    chan1(KIND_GREEN, 8),
    chan1(KIND_BLUE, 8),
);

/// 32-bit pixels with alpha, used by the delta image.
pub const CHAN_ARGB32: u32 = chan4(
    chan1(KIND_ALPHA, 8),
    chan1(KIND_RED, 8),
    chan1(KIND_GREEN, 8),
    chan1(KIND_BLUE, 8),
);

/// 1-bit grey, used only for masks.
pub const CHAN_GREY1: u32 = chan1(KIND_GREY, 1);

#[inline]
fn put_rect(buf: &mut BytesMut, r: Rect) {
    buf.put_i32_le(r.min_x);
    buf.put_i32_le(r.min_y);
    buf.put_i32_le(r.max_x);
    buf.put_i32_le(r.max_y);
}

#[inline]
fn put_point(buf: &mut BytesMut, p: Point) {
    buf.put_i32_le(p.x);
    buf.put_i32_le(p.y);
}

/// Copy `src` into `dst` over rectangle `r` through `mask`, reading the
/// source from `src_pt` and the mask from `mask_pt`.
pub fn composite(
    buf: &mut BytesMut,
    dst: u32,
    src: u32,
    mask: u32,
    r: Rect,
    src_pt: Point,
    mask_pt: Point,
) -> usize {
    buf.put_u8(OP_COMPOSITE);
    buf.put_u32_le(dst);
    buf.put_u32_le(src);
    buf.put_u32_le(mask);
    put_rect(buf, r);
    put_point(buf, src_pt);
    put_point(buf, mask_pt);
    COMPOSITE_LEN
}

/// Allocate image `id` with channel format `chan` over rectangle `r`,
/// filled with `color`. Replicated images tile their rectangle across an
/// unbounded clip.
pub fn allocate(
    buf: &mut BytesMut,
    id: u32,
    chan: u32,
    repl: bool,
    r: Rect,
    color: u32,
) -> usize {
    let clip = if repl {
        Rect::new(
            -REPL_CLIP_BOUND,
            -REPL_CLIP_BOUND,
            REPL_CLIP_BOUND,
            REPL_CLIP_BOUND,
        )
    } else {
        r
    };
    buf.put_u8(OP_ALLOC);
    buf.put_u32_le(id);
    buf.put_u32_le(0); // screen id
    buf.put_u32_le(0); // backing id
    buf.put_u8(0); // refresh method
    buf.put_u32_le(chan);
    buf.put_u8(repl as u8);
    put_rect(buf, r);
    put_rect(buf, clip);
    buf.put_u32_le(color);
    ALLOC_LEN
}

/// Release image `id` on the remote side.
pub fn free(buf: &mut BytesMut, id: u32) -> usize {
    buf.put_u8(OP_FREE);
    buf.put_u32_le(id);
    FREE_LEN
}

/// Bind the remote image published under `name` to client id `id`.
/// Names longer than 255 bytes are truncated.
pub fn bind_name(buf: &mut BytesMut, id: u32, name: &str) -> usize {
    let bytes = name.as_bytes();
    let n = bytes.len().min(255);
    buf.put_u8(OP_NAME);
    buf.put_u32_le(id);
    buf.put_u8(n as u8);
    buf.put_slice(&bytes[..n]);
    6 + n
}

/// Commit pending drawing operations to the display.
pub fn flush(buf: &mut BytesMut) -> usize {
    buf.put_u8(OP_FLUSH);
    FLUSH_LEN
}

/// Header for an uncompressed pixel load into `id` over `r`; the caller
/// appends `r.width() * r.height() * 4` pixel bytes.
pub fn load_header(buf: &mut BytesMut, id: u32, r: Rect) -> usize {
    buf.put_u8(OP_LOAD);
    buf.put_u32_le(id);
    put_rect(buf, r);
    LOAD_HEADER_LEN
}

/// Header for a compressed pixel load into `id` over `r`; the caller
/// appends the compressed stream.
pub fn load_compressed_header(buf: &mut BytesMut, id: u32, r: Rect) -> usize {
    buf.put_u8(OP_LOAD_COMPRESSED);
    buf.put_u32_le(id);
    put_rect(buf, r);
    LOAD_HEADER_LEN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_lengths_match_constants() {
        let mut buf = BytesMut::new();
        let r = Rect::new(1, 2, 3, 4);
        assert_eq!(
            composite(&mut buf, 9, 8, 7, r, Point::new(5, 6), Point::new(0, 0)),
            COMPOSITE_LEN
        );
        assert_eq!(buf.len(), COMPOSITE_LEN);

        buf.clear();
        assert_eq!(allocate(&mut buf, 1, CHAN_XRGB32, false, r, 0), ALLOC_LEN);
        assert_eq!(buf.len(), ALLOC_LEN);

        buf.clear();
        assert_eq!(free(&mut buf, 1), FREE_LEN);
        assert_eq!(buf.len(), FREE_LEN);

        buf.clear();
        assert_eq!(bind_name(&mut buf, 1, "window.3"), 6 + 8);
        assert_eq!(buf.len(), 6 + 8);

        buf.clear();
        assert_eq!(flush(&mut buf), FLUSH_LEN);
        assert_eq!(buf.len(), FLUSH_LEN);

        buf.clear();
        assert_eq!(load_header(&mut buf, 1, r), LOAD_HEADER_LEN);
        assert_eq!(buf.len(), LOAD_HEADER_LEN);

        buf.clear();
        assert_eq!(load_compressed_header(&mut buf, 1, r), LOAD_HEADER_LEN);
        assert_eq!(buf.len(), LOAD_HEADER_LEN);
    }

    #[test]
    fn composite_layout() {
        let mut buf = BytesMut::new();
        composite(
            &mut buf,
            0x11,
            0x22,
            0x33,
            Rect::new(1, 2, 3, 4),
            Point::new(-1, 6),
            Point::new(7, 8),
        );
        assert_eq!(buf[0], b'd');
        assert_eq!(&buf[1..5], &0x11u32.to_le_bytes());
        assert_eq!(&buf[5..9], &0x22u32.to_le_bytes());
        assert_eq!(&buf[9..13], &0x33u32.to_le_bytes());
        assert_eq!(&buf[13..17], &1i32.to_le_bytes());
        assert_eq!(&buf[29..33], &(-1i32).to_le_bytes());
    }

    #[test]
    fn replicated_alloc_uses_clip_sentinel() {
        let mut buf = BytesMut::new();
        allocate(
            &mut buf,
            5,
            CHAN_GREY1,
            true,
            Rect::new(0, 0, 1, 1),
            0xFFFF_FFFF,
        );
        // clip rectangle sits after op+id+screen+back+refresh+chan+repl+rect
        let clip_off = 1 + 4 + 4 + 4 + 1 + 4 + 1 + 16;
        let min_x = i32::from_le_bytes(buf[clip_off..clip_off + 4].try_into().unwrap());
        let max_x = i32::from_le_bytes(buf[clip_off + 8..clip_off + 12].try_into().unwrap());
        assert_eq!(min_x, -REPL_CLIP_BOUND);
        assert_eq!(max_x, REPL_CLIP_BOUND);
    }

    #[test]
    fn channel_descriptors_pack() {
        assert_eq!(CHAN_GREY1, 0x31);
        assert_eq!(CHAN_XRGB32 & 0xFF, chan1(KIND_BLUE, 8));
        assert_eq!(CHAN_ARGB32 >> 24, chan1(KIND_ALPHA, 8));
    }
}
