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

//! Outbound frame pipeline bridging a hosted headless compositor to a
//! remote bitmap drawing service.
//!
//! The compositor renders XRGB32 framebuffers; this crate diffs each frame
//! against the state the remote side is believed to hold, detects scrolled
//! regions with FFT phase correlation, compresses changed 16x16 tiles with
//! an LZ77-variant codec (choosing between a direct and an alpha-delta
//! encoding per tile), batches the resulting draw commands under the
//! transport's atomic-write bound, and streams them with pipelined writes
//! while a dedicated thread drains the replies asynchronously.
//!
//! # Architecture
//!
//! - [`wire`] — fixed-layout draw-command records (composite, allocate,
//!   free, name-bind, flush, pixel loads).
//! - [`transport`] — the message envelope over a caller-supplied byte
//!   stream, with a bounded atomic-write unit and remote-error flags.
//! - [`compress`] — the tile compressor: LZ77-variant byte codec with
//!   solid and alpha-delta specializations and an adaptive selector.
//! - [`pool`] — the compression worker pool (atomic index claiming,
//!   barrier-style completion).
//! - [`scroll`] — per-region phase-correlation motion estimation with
//!   compression-cost verification.
//! - [`frame`] — the framebuffer and dirty-tile bitmap.
//! - [`resources`] — remote image lifecycle (allocate/free/name-bind),
//!   window geometry, resize handling.
//! - [`drain`] — the asynchronous reply-draining thread with
//!   throttle/pause/resume.
//! - [`pipeline`] — the [`Core`] handle tying it all together: the
//!   double-buffered frame hand-off and the send-thread main loop.
//!
//! # Example
//!
//! ```no_run
//! use drawbridge::{Core, CoreOptions, Endpoints};
//! use drawbridge::transport::Transport;
//! use std::net::TcpStream;
//!
//! # fn main() -> drawbridge::Result<()> {
//! let conn = TcpStream::connect("remote:17010")?;
//! let transport = Transport::new(
//!     Box::new(conn.try_clone()?),
//!     Box::new(conn),
//!     8192,
//! );
//! let endpoints = Endpoints { draw_ctl: 1, draw_data: 2, win_ctl: 3, win_name: 4 };
//! let core = Core::start(transport, endpoints, CoreOptions::default())?;
//!
//! core.render_frame(|fb, damage| {
//!     // paint into fb, then mark what changed
//!     damage.mark_all();
//! });
//! core.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod compress;
pub mod drain;
pub mod frame;
pub mod pipeline;
pub mod pool;
pub mod resources;
pub mod scroll;
pub mod transport;
pub mod wire;

pub use frame::{DirtyMap, FrameBuffer};
pub use pipeline::{Core, CoreOptions};
pub use resources::Endpoints;

use thiserror::Error;

/// Side length of a tile in pixels. Edge tiles may be smaller.
pub const TILE_SIZE: usize = 16;

/// In-band marker written into the previous-frame reference for pixels
/// whose remote-side content is undefined (scroll-exposed strips, drain
/// error recovery). Never transmitted; never a legitimate pixel value.
pub const SENTINEL: u32 = 0xDEAD_BEEF;

/// A point in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Point { x, y }
    }
}

/// A half-open rectangle `[min_x, max_x) x [min_y, max_y)` in pixel
/// coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl Rect {
    pub const fn new(min_x: i32, min_y: i32, max_x: i32, max_y: i32) -> Self {
        Rect {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn width(&self) -> i32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> i32 {
        self.max_y - self.min_y
    }

    pub fn is_empty(&self) -> bool {
        self.max_x <= self.min_x || self.max_y <= self.min_y
    }

    /// Translate by `(dx, dy)`.
    pub fn translated(&self, dx: i32, dy: i32) -> Self {
        Rect::new(
            self.min_x + dx,
            self.min_y + dy,
            self.max_x + dx,
            self.max_y + dy,
        )
    }
}

/// Errors surfaced by the pipeline and its collaborators.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport-level I/O failure. Fatal for the send and drain threads.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote side replied with an error string.
    #[error("remote error: {0}")]
    Remote(String),

    /// A reply that does not match the protocol framing.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The control endpoint returned geometry that could not be parsed.
    #[error("bad geometry: {0}")]
    Geometry(String),

    /// Resource allocation at resize failed; old dimensions are retained.
    #[error("resource allocation failed: {0}")]
    Alloc(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
