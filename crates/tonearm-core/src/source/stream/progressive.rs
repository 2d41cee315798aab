//! Download buffer that can be read and seeked while it is still filling
//!
//! The download thread appends bytes, decoder threads read through a
//! [`ProgressiveReader`]. Reads past the downloaded range block until more
//! bytes arrive, the download ends, fails, or the buffer is released.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use symphonia::core::io::MediaSource;

use super::error::StreamError;

#[derive(Default)]
struct Inner {
    data: Vec<u8>,
    /// Declared length (Content-Length)
    total: Option<u64>,
    complete: bool,
    failure: Option<StreamError>,
    released: bool,
}

#[derive(Default)]
pub struct ProgressiveBuffer {
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl ProgressiveBuffer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_total(&self, total: Option<u64>) {
        let mut inner = self.lock();
        inner.total = total;
        if let Some(total) = total {
            inner.data.reserve(total as usize);
        }
    }

    /// Append downloaded bytes; false once the buffer was released
    pub fn append(&self, bytes: &[u8]) -> bool {
        let mut inner = self.lock();
        if inner.released {
            return false;
        }
        inner.data.extend_from_slice(bytes);
        self.changed.notify_all();
        true
    }

    /// Mark the download as complete
    pub fn finish(&self) {
        let mut inner = self.lock();
        inner.complete = true;
        self.changed.notify_all();
    }

    /// Record a download failure; pending reads fail with it
    pub fn fail(&self, error: StreamError) {
        let mut inner = self.lock();
        inner.failure = Some(error);
        self.changed.notify_all();
    }

    /// Stop the download and fail every reader
    pub fn release(&self) {
        let mut inner = self.lock();
        inner.released = true;
        inner.data = Vec::new();
        self.changed.notify_all();
    }

    pub fn is_released(&self) -> bool {
        self.lock().released
    }

    pub fn failure(&self) -> Option<StreamError> {
        self.lock().failure.clone()
    }

    pub fn downloaded(&self) -> usize {
        self.lock().data.len()
    }

    pub fn is_complete(&self) -> bool {
        self.lock().complete
    }

    pub fn reader(self: &Arc<Self>) -> ProgressiveReader {
        ProgressiveReader {
            buffer: self.clone(),
            position: 0,
        }
    }
}

/// `Read + Seek` view over a [`ProgressiveBuffer`]
pub struct ProgressiveReader {
    buffer: Arc<ProgressiveBuffer>,
    position: u64,
}

impl ProgressiveReader {
    /// Block until the final length is known
    fn wait_for_length(&self) -> io::Result<u64> {
        let mut inner = self.buffer.lock();
        loop {
            if inner.released {
                return Err(released_error());
            }
            if let Some(total) = inner.total {
                return Ok(total);
            }
            if inner.complete {
                return Ok(inner.data.len() as u64);
            }
            if let Some(failure) = &inner.failure {
                return Err(io::Error::other(failure.to_string()));
            }
            inner = self
                .buffer
                .changed
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

fn released_error() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, StreamError::Released.to_string())
}

impl Read for ProgressiveReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut inner = self.buffer.lock();
        loop {
            if inner.released {
                return Err(released_error());
            }
            let available = inner.data.len() as u64;
            if self.position < available {
                let start = self.position as usize;
                let n = buf.len().min(inner.data.len() - start);
                buf[..n].copy_from_slice(&inner.data[start..start + n]);
                self.position += n as u64;
                return Ok(n);
            }
            if inner.complete {
                return Ok(0);
            }
            if let Some(failure) = &inner.failure {
                return Err(io::Error::other(failure.to_string()));
            }
            inner = self
                .buffer
                .changed
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl Seek for ProgressiveReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
            SeekFrom::End(delta) => self.wait_for_length()?.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of stream")
        })?;
        self.position = target;
        Ok(target)
    }
}

impl MediaSource for ProgressiveReader {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        let inner = self.buffer.lock();
        inner
            .total
            .or_else(|| inner.complete.then_some(inner.data.len() as u64))
    }
}
