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

//! Remote draw-resource lifecycle.
//!
//! Owns the client id, window geometry and the four remote images the
//! pipeline draws with:
//!
//! - the *main* image (XRGB32, content-sized) holding the transmitted
//!   frame,
//! - a 1x1 replicated opaque *mask*,
//! - a 1x1 replicated *border fill* color,
//! - the *delta* image (ARGB32, content-sized) that delta tiles are
//!   loaded into before being composited onto the main image.
//!
//! Endpoints are caller-supplied fids on the connected transport. All
//! traffic here is synchronous and therefore only legal while the drain
//! is quiescent.
//!
//! Content dimensions are the window dimensions aligned down to tile
//! boundaries, floored at four tiles, so the tile grid always covers the
//! content exactly; the leftover window area is painted with the border
//! fill.

use std::sync::Arc;

use bytes::BytesMut;
use log::{debug, info, warn};

use crate::transport::Transport;
use crate::wire;
use crate::{Error, Rect, Result, TILE_SIZE};

/// Smallest supported content dimension.
pub const MIN_DIM: usize = 4 * TILE_SIZE;

/// Pre-opened endpoint fids.
#[derive(Debug, Clone, Copy)]
pub struct Endpoints {
    /// Draw control endpoint: client id and screen geometry.
    pub draw_ctl: u32,
    /// Draw data endpoint: command batches.
    pub draw_data: u32,
    /// Window control endpoint: window geometry.
    pub win_ctl: u32,
    /// Window name endpoint.
    pub win_name: u32,
}

/// Remote images and geometry owned by the pipeline.
pub struct DrawResources {
    transport: Arc<Transport>,
    endpoints: Endpoints,
    client_id: u32,
    window_name: Option<String>,
    window_rect: Rect,
    width: usize,
    height: usize,
    next_id: u32,
    screen_id: u32,
    main_id: u32,
    mask_id: u32,
    fill_id: u32,
    delta_id: u32,
    border_color: u32,
}

/// Align a window dimension down to the tile grid, floored at
/// [`MIN_DIM`].
pub fn content_dim(window: usize) -> usize {
    (window / TILE_SIZE * TILE_SIZE).max(MIN_DIM)
}

/// Parse a control read: twelve 12-byte decimal fields.
fn parse_ctl(data: &[u8]) -> Result<[i64; 12]> {
    if data.len() < 12 * 12 {
        return Err(Error::Geometry(format!(
            "control read too short: {} bytes",
            data.len()
        )));
    }
    let mut fields = [0i64; 12];
    for (i, field) in fields.iter_mut().enumerate() {
        let chunk = &data[i * 12..(i + 1) * 12];
        let text = std::str::from_utf8(chunk)
            .map_err(|_| Error::Geometry("non-ascii control field".into()))?;
        *field = text
            .trim()
            .parse()
            .map_err(|_| Error::Geometry(format!("bad control field {i}: {text:?}")))?;
    }
    Ok(fields)
}

fn rect_from(fields: &[i64; 12]) -> Rect {
    Rect::new(
        fields[4] as i32,
        fields[5] as i32,
        fields[6] as i32,
        fields[7] as i32,
    )
}

impl DrawResources {
    /// Connect to the draw service: read the client id and screen
    /// geometry, bind the window by name when one is published, and
    /// allocate the image set.
    pub fn open(
        transport: Arc<Transport>,
        endpoints: Endpoints,
        border_color: u32,
    ) -> Result<Self> {
        let ctl = transport.read_sync(endpoints.draw_ctl, 0, 144)?;
        let fields = parse_ctl(&ctl)?;
        let client_id = fields[0] as u32;
        let screen_rect = rect_from(&fields);

        let mut res = DrawResources {
            transport,
            endpoints,
            client_id,
            window_name: None,
            window_rect: screen_rect,
            width: 0,
            height: 0,
            next_id: 1,
            screen_id: 0,
            main_id: 0,
            mask_id: 0,
            fill_id: 0,
            delta_id: 0,
            border_color,
        };
        res.bind_window()?;
        res.width = content_dim(res.window_rect.width() as usize);
        res.height = content_dim(res.window_rect.height() as usize);
        res.allocate_images()?;
        info!(
            "draw resources open: client {} window {:?} content {}x{}",
            client_id, res.window_rect, res.width, res.height
        );
        Ok(res)
    }

    fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Read the published window name, trailing newline stripped.
    fn read_window_name(&self) -> Result<String> {
        let raw = self.transport.read_sync(self.endpoints.win_name, 0, 256)?;
        let name = String::from_utf8_lossy(&raw);
        Ok(name.trim_end_matches('\n').to_string())
    }

    /// Bind the named window image, or allocate a screen-sized stand-in
    /// when no name is published (headless service).
    fn bind_window(&mut self) -> Result<()> {
        let mut batch = BytesMut::new();
        match self.read_window_name() {
            Ok(name) if !name.is_empty() => {
                let id = self.alloc_id();
                wire::bind_name(&mut batch, id, &name);
                self.transport
                    .write_sync(self.endpoints.draw_data, 0, &batch)?;
                let ctl = self.transport.read_sync(self.endpoints.win_ctl, 0, 144)?;
                self.window_rect = rect_from(&parse_ctl(&ctl)?);
                self.screen_id = id;
                self.window_name = Some(name);
            }
            Ok(_) | Err(Error::Remote(_)) => {
                let id = self.alloc_id();
                wire::allocate(&mut batch, id, wire::CHAN_XRGB32, false, self.window_rect, 0);
                self.transport
                    .write_sync(self.endpoints.draw_data, 0, &batch)?;
                self.screen_id = id;
                self.window_name = None;
                debug!("no window name published; using stand-in screen image");
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Allocate main, mask, border-fill and delta images for the current
    /// content dimensions.
    fn allocate_images(&mut self) -> Result<()> {
        let content = Rect::new(0, 0, self.width as i32, self.height as i32);
        let one = Rect::new(0, 0, 1, 1);
        let main_id = self.alloc_id();
        let mask_id = self.alloc_id();
        let fill_id = self.alloc_id();
        let delta_id = self.alloc_id();
        let mut batch = BytesMut::new();
        wire::allocate(&mut batch, main_id, wire::CHAN_XRGB32, false, content, 0);
        wire::allocate(&mut batch, mask_id, wire::CHAN_GREY1, true, one, 0xFFFF_FFFF);
        wire::allocate(&mut batch, fill_id, wire::CHAN_ARGB32, true, one, self.border_color);
        wire::allocate(&mut batch, delta_id, wire::CHAN_ARGB32, false, content, 0);
        self.transport
            .write_sync(self.endpoints.draw_data, 0, &batch)
            .map_err(|e| Error::Alloc(e.to_string()))?;
        self.main_id = main_id;
        self.mask_id = mask_id;
        self.fill_id = fill_id;
        self.delta_id = delta_id;
        Ok(())
    }

    /// Free and re-allocate the content-sized images for new window
    /// dimensions. On failure the old dimensions are retained.
    pub fn reallocate(&mut self, window: Rect) -> Result<()> {
        let width = content_dim(window.width() as usize);
        let height = content_dim(window.height() as usize);
        let mut batch = BytesMut::new();
        wire::free(&mut batch, self.main_id);
        wire::free(&mut batch, self.delta_id);
        let content = Rect::new(0, 0, width as i32, height as i32);
        let main_id = self.alloc_id();
        let delta_id = self.alloc_id();
        wire::allocate(&mut batch, main_id, wire::CHAN_XRGB32, false, content, 0);
        wire::allocate(&mut batch, delta_id, wire::CHAN_ARGB32, false, content, 0);
        match self
            .transport
            .write_sync(self.endpoints.draw_data, 0, &batch)
        {
            Ok(_) => {
                self.window_rect = window;
                self.width = width;
                self.height = height;
                self.main_id = main_id;
                self.delta_id = delta_id;
                info!("resized to content {width}x{height} in window {window:?}");
                Ok(())
            }
            Err(e) => {
                warn!("resize allocation failed, keeping {}x{}: {e}", self.width, self.height);
                Err(Error::Alloc(e.to_string()))
            }
        }
    }

    /// Recover from a remote "unknown id": drop the window binding,
    /// re-read the name, re-bind and re-read geometry. Returns `true`
    /// when the geometry changed and a resize must follow instead of a
    /// plain full frame.
    pub fn rebind_window(&mut self) -> Result<bool> {
        let mut batch = BytesMut::new();
        wire::free(&mut batch, self.screen_id);
        // The stale binding may already be gone remote-side; that error
        // is exactly what we are recovering from.
        let _ = self.transport.write_sync(self.endpoints.draw_data, 0, &batch);
        let _ = self.transport.take_unknown_id();
        let before = self.window_rect;
        self.bind_window()?;
        debug!("rebound window: {:?} -> {:?}", before, self.window_rect);
        Ok(self.window_rect.width() != before.width()
            || self.window_rect.height() != before.height())
    }

    /// Current window geometry as read from the control endpoint.
    pub fn read_window_rect(&self) -> Result<Rect> {
        let ctl = self.transport.read_sync(self.endpoints.win_ctl, 0, 144)?;
        Ok(rect_from(&parse_ctl(&ctl)?))
    }

    /// Free every remote image. Called on shutdown.
    pub fn release(&mut self) -> Result<()> {
        let mut batch = BytesMut::new();
        wire::free(&mut batch, self.main_id);
        wire::free(&mut batch, self.delta_id);
        wire::free(&mut batch, self.mask_id);
        wire::free(&mut batch, self.fill_id);
        wire::free(&mut batch, self.screen_id);
        self.transport
            .write_sync(self.endpoints.draw_data, 0, &batch)?;
        Ok(())
    }

    pub fn client_id(&self) -> u32 {
        self.client_id
    }

    pub fn data_fid(&self) -> u32 {
        self.endpoints.draw_data
    }

    /// Content width (tile-aligned).
    pub fn width(&self) -> usize {
        self.width
    }

    /// Content height (tile-aligned).
    pub fn height(&self) -> usize {
        self.height
    }

    pub fn window_rect(&self) -> Rect {
        self.window_rect
    }

    /// Record a window move (same dimensions, new position).
    pub fn set_window_rect(&mut self, r: Rect) {
        debug_assert_eq!(r.width(), self.window_rect.width());
        debug_assert_eq!(r.height(), self.window_rect.height());
        self.window_rect = r;
    }

    pub fn screen_id(&self) -> u32 {
        self.screen_id
    }

    pub fn main_id(&self) -> u32 {
        self.main_id
    }

    pub fn mask_id(&self) -> u32 {
        self.mask_id
    }

    pub fn fill_id(&self) -> u32 {
        self.fill_id
    }

    pub fn delta_id(&self) -> u32 {
        self.delta_id
    }

    /// Window strips not covered by the tile-aligned content, in window
    /// coordinates. Painted with the border fill each frame.
    pub fn border_rects(&self) -> Vec<Rect> {
        let w = self.window_rect;
        let cw = self.width as i32;
        let ch = self.height as i32;
        let mut rects = Vec::new();
        if w.min_x + cw < w.max_x {
            rects.push(Rect::new(w.min_x + cw, w.min_y, w.max_x, w.max_y));
        }
        if w.min_y + ch < w.max_y {
            rects.push(Rect::new(w.min_x, w.min_y + ch, w.min_x + cw, w.max_y));
        }
        rects
    }
}
