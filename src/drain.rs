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

//! Asynchronous reply drain.
//!
//! The send thread issues pipelined writes without waiting; every write
//! is matched by exactly one reply, consumed here on a dedicated thread.
//! The send thread throttles itself against the `pending` counter, and
//! can pause the drain to create a quiescent window for synchronous
//! transport traffic (window re-lookup, resize).
//!
//! Replies carrying an error payload are counted and classified onto the
//! transport's recovery flags; a transport-level read failure is fatal
//! and stops the drain, which the send thread observes via
//! [`Drain::is_running`].

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use log::{debug, error, trace, warn};

use crate::transport::{Reply, Transport};
use crate::Result;

struct Shared {
    transport: Arc<Transport>,
    pending: AtomicUsize,
    errors: AtomicUsize,
    running: AtomicBool,
    paused: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
    done: Condvar,
}

/// Handle to the drain thread.
pub struct Drain {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl Drain {
    /// Spawn the drain thread over `transport`.
    pub fn start(transport: Arc<Transport>) -> Result<Self> {
        let shared = Arc::new(Shared {
            transport,
            pending: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
            running: AtomicBool::new(true),
            paused: AtomicBool::new(false),
            lock: Mutex::new(()),
            wake: Condvar::new(),
            done: Condvar::new(),
        });
        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("drain".into())
            .spawn(move || drain_loop(&thread_shared))?;
        Ok(Drain {
            shared,
            handle: Some(handle),
        })
    }

    /// Account one issued pipelined write and wake the drain.
    pub fn notify(&self) {
        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        let _guard = self.shared.lock.lock().unwrap();
        self.shared.wake.notify_all();
    }

    /// Block until at most `max` replies remain outstanding.
    pub fn throttle(&self, max: usize) {
        let mut guard = self.shared.lock.lock().unwrap();
        while self.shared.pending.load(Ordering::Acquire) > max
            && self.shared.running.load(Ordering::Acquire)
        {
            guard = self.shared.done.wait(guard).unwrap();
        }
    }

    /// Stop reading new replies once the pipeline is empty and wait for
    /// that quiescence. Synchronous transport traffic is legal until
    /// [`resume`](Drain::resume).
    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::Release);
        {
            let _guard = self.shared.lock.lock().unwrap();
            self.shared.wake.notify_all();
        }
        let mut guard = self.shared.lock.lock().unwrap();
        while self.shared.pending.load(Ordering::Acquire) > 0
            && self.shared.running.load(Ordering::Acquire)
        {
            guard = self.shared.done.wait(guard).unwrap();
        }
        trace!("drain paused");
    }

    /// Resume reply consumption after [`pause`](Drain::pause).
    pub fn resume(&self) {
        self.shared.paused.store(false, Ordering::Release);
        let _guard = self.shared.lock.lock().unwrap();
        self.shared.wake.notify_all();
    }

    /// Outstanding pipelined writes.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    /// Total error replies observed.
    pub fn errors(&self) -> usize {
        self.shared.errors.load(Ordering::Acquire)
    }

    /// False once the drain has hit a fatal transport failure or been
    /// stopped.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Shut down: stop the thread, join it, then drain any replies still
    /// owed so the stream is left clean.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        {
            let _guard = self.shared.lock.lock().unwrap();
            self.shared.running.store(false, Ordering::Release);
            self.shared.wake.notify_all();
            self.shared.done.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        while self.shared.pending.load(Ordering::Acquire) > 0 {
            match self.shared.transport.read_reply() {
                Ok(reply) => {
                    if let Reply::Error(msg) = reply {
                        warn!("error reply during shutdown drain: {msg}");
                    }
                    self.shared.pending.fetch_sub(1, Ordering::AcqRel);
                }
                Err(e) => {
                    warn!("shutdown drain aborted: {e}");
                    break;
                }
            }
        }
        debug!("drain stopped");
    }
}

impl Drop for Drain {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.shutdown();
        }
    }
}

fn drain_loop(shared: &Shared) {
    loop {
        {
            let mut guard = shared.lock.lock().unwrap();
            loop {
                if !shared.running.load(Ordering::Acquire) {
                    return;
                }
                if shared.pending.load(Ordering::Acquire) > 0 {
                    break;
                }
                if shared.paused.load(Ordering::Acquire) {
                    // Quiescent: let pause() observe pending == 0.
                    shared.done.notify_all();
                }
                guard = shared.wake.wait(guard).unwrap();
            }
        }
        match shared.transport.read_reply() {
            Ok(reply) => {
                if let Reply::Error(msg) = &reply {
                    shared.errors.fetch_add(1, Ordering::AcqRel);
                    shared.transport.note_error_text(msg);
                    warn!("remote error reply: {msg}");
                }
                shared.pending.fetch_sub(1, Ordering::AcqRel);
                let _guard = shared.lock.lock().unwrap();
                shared.done.notify_all();
            }
            Err(e) => {
                error!("drain read failed: {e}");
                shared.running.store(false, Ordering::Release);
                let _guard = shared.lock.lock().unwrap();
                shared.done.notify_all();
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MSG_HEADER_LEN, R_ERROR, R_WRITE};
    use std::io::{Read, Write};
    use std::sync::mpsc::{channel, Sender};

    /// Blocking reader fed through a channel, emulating a socket.
    struct ChanReader {
        rx: std::sync::mpsc::Receiver<Vec<u8>>,
        buf: Vec<u8>,
    }

    impl Read for ChanReader {
        fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
            while self.buf.is_empty() {
                match self.rx.recv() {
                    Ok(chunk) => self.buf = chunk,
                    Err(_) => return Ok(0), // EOF
                }
            }
            let n = out.len().min(self.buf.len());
            out[..n].copy_from_slice(&self.buf[..n]);
            self.buf.drain(..n);
            Ok(n)
        }
    }

    struct NullWriter;

    impl Write for NullWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn reply(msg_type: u8, body: &[u8]) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(&((MSG_HEADER_LEN + body.len()) as u32).to_le_bytes());
        v.push(msg_type);
        v.extend_from_slice(&1u16.to_le_bytes());
        v.extend_from_slice(body);
        v
    }

    fn drain_with_feed() -> (Drain, Sender<Vec<u8>>, Arc<Transport>) {
        let (tx, rx) = channel();
        let transport = Arc::new(Transport::new(
            Box::new(ChanReader { rx, buf: Vec::new() }),
            Box::new(NullWriter),
            8192,
        ));
        let drain = Drain::start(Arc::clone(&transport)).unwrap();
        (drain, tx, transport)
    }

    #[test]
    fn notify_then_reply_reaches_zero() {
        let (drain, tx, _t) = drain_with_feed();
        drain.notify();
        drain.notify();
        tx.send(reply(R_WRITE, &1u32.to_le_bytes())).unwrap();
        tx.send(reply(R_WRITE, &1u32.to_le_bytes())).unwrap();
        drain.throttle(0);
        assert_eq!(drain.pending(), 0);
        assert_eq!(drain.errors(), 0);
        drain.stop();
    }

    #[test]
    fn pause_waits_for_quiescence_and_resume_restarts() {
        let (drain, tx, _t) = drain_with_feed();
        drain.notify();
        tx.send(reply(R_WRITE, &1u32.to_le_bytes())).unwrap();
        drain.pause();
        assert_eq!(drain.pending(), 0);
        drain.resume();
        drain.notify();
        tx.send(reply(R_WRITE, &1u32.to_le_bytes())).unwrap();
        drain.throttle(0);
        drain.stop();
    }

    #[test]
    fn error_reply_counts_and_flags() {
        let (drain, tx, transport) = drain_with_feed();
        let text = b"image is deleted: unknown id 9";
        let mut body = Vec::new();
        body.extend_from_slice(&(text.len() as u16).to_le_bytes());
        body.extend_from_slice(text);
        drain.notify();
        tx.send(reply(R_ERROR, &body)).unwrap();
        drain.throttle(0);
        assert_eq!(drain.errors(), 1);
        assert!(transport.take_unknown_id());
        assert!(transport.window_deleted());
        drain.stop();
    }

    #[test]
    fn stop_drains_outstanding_replies() {
        let (drain, tx, _t) = drain_with_feed();
        drain.notify();
        // Reply arrives only after stop() begins its shutdown drain.
        tx.send(reply(R_WRITE, &1u32.to_le_bytes())).unwrap();
        drain.stop();
    }

    #[test]
    fn fatal_read_failure_clears_running() {
        let (drain, tx, _t) = drain_with_feed();
        drain.notify();
        drop(tx); // EOF mid-pipeline
        // throttle must not deadlock once the drain dies.
        drain.throttle(0);
        assert!(!drain.is_running());
    }
}
