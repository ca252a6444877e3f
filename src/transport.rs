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

//! Message-stream transport.
//!
//! The remote drawing service is reached through a message-oriented file
//! protocol over a reliable byte stream the caller supplies. Every
//! message is framed as `length[4] type[1] tag[2] body`, little-endian,
//! with `length` covering the whole message. Requests address endpoints
//! by fid:
//!
//! | Message     | Type | Body                                  |
//! |-------------|-----:|---------------------------------------|
//! | write req   | 118  | `fid[4] offset[8] count[4] data[count]` |
//! | write reply | 119  | `count[4]`                             |
//! | read req    | 116  | `fid[4] offset[8] count[4]`            |
//! | read reply  | 117  | `count[4] data[count]`                 |
//! | error reply | 107  | `len[2] utf8 message`                  |
//!
//! Writes up to the negotiated `iounit` are applied atomically by the
//! remote side; [`Transport::max_batch`] is the largest command batch
//! that fits one such write. Synchronous request/reply pairs are only
//! legal while the drain thread is quiescent (paused or not yet
//! started); the pipelined path sends requests without waiting and the
//! drain consumes the replies.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Mutex;

use bytes::{BufMut, BytesMut};
use log::{debug, trace};

use crate::{Error, Result};

pub const T_READ: u8 = 116;
pub const R_READ: u8 = 117;
pub const T_WRITE: u8 = 118;
pub const R_WRITE: u8 = 119;
pub const R_ERROR: u8 = 107;

/// `length[4] type[1] tag[2]`.
pub const MSG_HEADER_LEN: usize = 7;

/// Full framing overhead of a write request around its data payload.
pub const WRITE_OVERHEAD: usize = MSG_HEADER_LEN + 4 + 8 + 4;

/// Upper bound on reply bodies; anything larger is a framing error.
const MAX_REPLY_LEN: usize = 1 << 20;

/// A parsed reply envelope.
#[derive(Debug)]
pub enum Reply {
    Write(u32),
    Read(Vec<u8>),
    Error(String),
}

/// The connection to the remote drawing service.
pub struct Transport {
    reader: Mutex<Box<dyn Read + Send>>,
    writer: Mutex<Box<dyn Write + Send>>,
    iounit: usize,
    next_tag: AtomicU16,
    unknown_id: AtomicBool,
    short_write: AtomicBool,
    window_deleted: AtomicBool,
}

impl Transport {
    /// Wrap a connected byte stream. `iounit` is the remote side's
    /// maximum atomic-write unit, obtained at open time.
    pub fn new(
        reader: Box<dyn Read + Send>,
        writer: Box<dyn Write + Send>,
        iounit: usize,
    ) -> Self {
        debug_assert!(iounit > WRITE_OVERHEAD);
        Transport {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            iounit,
            next_tag: AtomicU16::new(1),
            unknown_id: AtomicBool::new(false),
            short_write: AtomicBool::new(false),
            window_deleted: AtomicBool::new(false),
        }
    }

    pub fn iounit(&self) -> usize {
        self.iounit
    }

    /// Largest command batch that still forms one atomic write.
    pub fn max_batch(&self) -> usize {
        self.iounit - WRITE_OVERHEAD
    }

    #[inline]
    fn take_tag(&self) -> u16 {
        self.next_tag.fetch_add(1, Ordering::Relaxed)
    }

    fn send(&self, msg: &[u8]) -> Result<()> {
        let mut w = self.writer.lock().unwrap();
        w.write_all(msg)?;
        w.flush()?;
        Ok(())
    }

    /// Issue a write request without waiting for its reply. The caller
    /// must arrange for exactly one reply to be drained later.
    pub fn write_pipelined(&self, fid: u32, offset: u64, data: &[u8]) -> Result<()> {
        if data.len() > self.max_batch() {
            return Err(Error::Protocol(format!(
                "write of {} bytes exceeds atomic unit {}",
                data.len(),
                self.max_batch()
            )));
        }
        let mut msg = BytesMut::with_capacity(WRITE_OVERHEAD + data.len());
        msg.put_u32_le((WRITE_OVERHEAD + data.len()) as u32);
        msg.put_u8(T_WRITE);
        msg.put_u16_le(self.take_tag());
        msg.put_u32_le(fid);
        msg.put_u64_le(offset);
        msg.put_u32_le(data.len() as u32);
        msg.put_slice(data);
        trace!("pipelined write fid {} len {}", fid, data.len());
        self.send(&msg)
    }

    /// Read and parse one reply envelope. Called by the drain thread, or
    /// by the synchronous paths while the drain is quiescent.
    pub fn read_reply(&self) -> Result<Reply> {
        let mut r = self.reader.lock().unwrap();
        let mut header = [0u8; MSG_HEADER_LEN];
        r.read_exact(&mut header)?;
        let length = u32::from_le_bytes(header[0..4].try_into().unwrap()) as usize;
        let msg_type = header[4];
        if length < MSG_HEADER_LEN || length - MSG_HEADER_LEN > MAX_REPLY_LEN {
            return Err(Error::Protocol(format!("bad reply length {length}")));
        }
        let mut body = vec![0u8; length - MSG_HEADER_LEN];
        r.read_exact(&mut body)?;
        drop(r);
        match msg_type {
            R_WRITE => {
                if body.len() != 4 {
                    return Err(Error::Protocol("short write reply".into()));
                }
                Ok(Reply::Write(u32::from_le_bytes(body[..].try_into().unwrap())))
            }
            R_READ => {
                if body.len() < 4 {
                    return Err(Error::Protocol("short read reply".into()));
                }
                let count = u32::from_le_bytes(body[0..4].try_into().unwrap()) as usize;
                if body.len() < 4 + count {
                    return Err(Error::Protocol("truncated read reply".into()));
                }
                Ok(Reply::Read(body[4..4 + count].to_vec()))
            }
            R_ERROR => {
                if body.len() < 2 {
                    return Err(Error::Protocol("short error reply".into()));
                }
                let n = u16::from_le_bytes(body[0..2].try_into().unwrap()) as usize;
                let end = (2 + n).min(body.len());
                Ok(Reply::Error(
                    String::from_utf8_lossy(&body[2..end]).into_owned(),
                ))
            }
            t => Err(Error::Protocol(format!("unexpected reply type {t}"))),
        }
    }

    /// Write and wait for the matching reply. Only legal while no
    /// pipelined replies are outstanding.
    pub fn write_sync(&self, fid: u32, offset: u64, data: &[u8]) -> Result<usize> {
        self.write_pipelined(fid, offset, data)?;
        match self.read_reply()? {
            Reply::Write(count) => Ok(count as usize),
            Reply::Error(msg) => {
                self.note_error_text(&msg);
                Err(Error::Remote(msg))
            }
            Reply::Read(_) => Err(Error::Protocol("read reply to a write".into())),
        }
    }

    /// Read up to `count` bytes from an endpoint. Only legal while no
    /// pipelined replies are outstanding.
    pub fn read_sync(&self, fid: u32, offset: u64, count: u32) -> Result<Vec<u8>> {
        let mut msg = BytesMut::with_capacity(MSG_HEADER_LEN + 16);
        msg.put_u32_le((MSG_HEADER_LEN + 16) as u32);
        msg.put_u8(T_READ);
        msg.put_u16_le(self.take_tag());
        msg.put_u32_le(fid);
        msg.put_u64_le(offset);
        msg.put_u32_le(count);
        self.send(&msg)?;
        match self.read_reply()? {
            Reply::Read(data) => Ok(data),
            Reply::Error(msg) => {
                self.note_error_text(&msg);
                Err(Error::Remote(msg))
            }
            Reply::Write(_) => Err(Error::Protocol("write reply to a read".into())),
        }
    }

    /// Classify a remote error string into the sticky recovery flags.
    pub(crate) fn note_error_text(&self, msg: &str) {
        if msg.contains("unknown id") {
            self.unknown_id.store(true, Ordering::Release);
        }
        if msg.contains("short") {
            self.short_write.store(true, Ordering::Release);
        }
        if msg.contains("deleted") {
            self.window_deleted.store(true, Ordering::Release);
        }
        debug!("remote error noted: {msg}");
    }

    /// Consume the image-not-found flag.
    pub fn take_unknown_id(&self) -> bool {
        self.unknown_id.swap(false, Ordering::AcqRel)
    }

    /// Consume the short-write flag.
    pub fn take_short_write(&self) -> bool {
        self.short_write.swap(false, Ordering::AcqRel)
    }

    /// Whether the remote window has been deleted (sticky).
    pub fn window_deleted(&self) -> bool {
        self.window_deleted.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Arc;

    /// `Write` half that appends into a shared buffer.
    #[derive(Clone)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn reply_bytes(msg_type: u8, body: &[u8]) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(&((MSG_HEADER_LEN + body.len()) as u32).to_le_bytes());
        v.push(msg_type);
        v.extend_from_slice(&5u16.to_le_bytes());
        v.extend_from_slice(body);
        v
    }

    fn transport_reading(replies: Vec<u8>) -> (Transport, Arc<Mutex<Vec<u8>>>) {
        let written = Arc::new(Mutex::new(Vec::new()));
        let t = Transport::new(
            Box::new(Cursor::new(replies)),
            Box::new(SharedBuf(Arc::clone(&written))),
            8192,
        );
        (t, written)
    }

    #[test]
    fn write_request_framing() {
        let (t, written) = transport_reading(Vec::new());
        t.write_pipelined(7, 0, b"abc").unwrap();
        let w = written.lock().unwrap();
        assert_eq!(w.len(), WRITE_OVERHEAD + 3);
        assert_eq!(u32::from_le_bytes(w[0..4].try_into().unwrap()) as usize, w.len());
        assert_eq!(w[4], T_WRITE);
        assert_eq!(u32::from_le_bytes(w[7..11].try_into().unwrap()), 7); // fid
        assert_eq!(u32::from_le_bytes(w[19..23].try_into().unwrap()), 3); // count
        assert_eq!(&w[23..], b"abc");
    }

    #[test]
    fn oversized_write_is_refused() {
        let (t, _) = transport_reading(Vec::new());
        let data = vec![0u8; t.max_batch() + 1];
        assert!(t.write_pipelined(1, 0, &data).is_err());
    }

    #[test]
    fn write_sync_round_trip() {
        let (t, _) = transport_reading(reply_bytes(R_WRITE, &3u32.to_le_bytes()));
        assert_eq!(t.write_sync(1, 0, b"xyz").unwrap(), 3);
    }

    #[test]
    fn error_reply_sets_flags() {
        let mut body = Vec::new();
        let text = b"draw: unknown id 42";
        body.extend_from_slice(&(text.len() as u16).to_le_bytes());
        body.extend_from_slice(text);
        let (t, _) = transport_reading(reply_bytes(R_ERROR, &body));
        let err = t.write_sync(1, 0, b"z").unwrap_err();
        assert!(matches!(err, Error::Remote(_)));
        assert!(t.take_unknown_id());
        assert!(!t.take_unknown_id()); // consumed
        assert!(!t.take_short_write());
    }

    #[test]
    fn read_sync_returns_payload() {
        let mut body = Vec::new();
        body.extend_from_slice(&4u32.to_le_bytes());
        body.extend_from_slice(b"geom");
        let (t, written) = transport_reading(reply_bytes(R_READ, &body));
        assert_eq!(t.read_sync(3, 10, 64).unwrap(), b"geom");
        let w = written.lock().unwrap();
        assert_eq!(w[4], T_READ);
        assert_eq!(u64::from_le_bytes(w[11..19].try_into().unwrap()), 10); // offset
    }
}
