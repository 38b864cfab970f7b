//! Bounded pool of reusable stream compressors.
//!
//! Submission compresses the principal's ownership groups into the job record.
//! Compressors hold a scratch buffer worth reusing, so a fixed-capacity pool
//! hands them out: acquisition awaits a semaphore permit (and therefore
//! inherits the request's cancellation), and the guard returns the compressor
//! on every exit path. Failing to return one is a bug the guard makes
//! impossible.

use std::io::{self, Read, Write};
use std::ops::{Deref, DerefMut};
use std::sync::Mutex;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use thiserror::Error;
use tokio::sync::{Semaphore, SemaphorePermit};

/// A reusable zlib compressor with a retained scratch buffer.
pub struct ZlibCompressor {
    level: Compression,
    buf: Vec<u8>,
}

impl ZlibCompressor {
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level),
            buf: Vec::new(),
        }
    }

    /// Compresses `data`, reusing the internal scratch buffer.
    pub fn compress(&mut self, data: &[u8]) -> io::Result<Vec<u8>> {
        self.buf.clear();
        let mut encoder = ZlibEncoder::new(&mut self.buf, self.level);
        encoder.write_all(data)?;
        encoder.finish()?;
        Ok(self.buf.clone())
    }
}

/// Compresses a list of strings (JSON-encoded) into a blob.
pub fn compress_string_list(
    compressor: &mut ZlibCompressor,
    values: &[String],
) -> io::Result<Vec<u8>> {
    let encoded = serde_json::to_vec(values).map_err(io::Error::other)?;
    compressor.compress(&encoded)
}

/// Inverse of [`compress_string_list`].
pub fn decompress_string_list(blob: &[u8]) -> io::Result<Vec<String>> {
    let mut decoder = ZlibDecoder::new(blob);
    let mut decoded = Vec::new();
    decoder.read_to_end(&mut decoded)?;
    serde_json::from_slice(&decoded).map_err(io::Error::other)
}

/// Sizing for [`CompressorPool`].
#[derive(Debug, Clone)]
pub struct CompressorPoolConfig {
    /// Hard cap on concurrently borrowed compressors; callers block beyond it.
    pub max_total: usize,

    /// Compressors created eagerly at pool construction.
    pub min_idle: usize,

    /// Idle compressors retained beyond this count are dropped on return.
    pub max_idle: usize,

    /// zlib compression level.
    pub level: u32,
}

impl Default for CompressorPoolConfig {
    fn default() -> Self {
        Self {
            max_total: 100,
            min_idle: 10,
            max_idle: 50,
            level: 6,
        }
    }
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("compressor pool is closed")]
    Closed,
}

/// Fixed-capacity pool of [`ZlibCompressor`]s.
pub struct CompressorPool {
    permits: Semaphore,
    idle: Mutex<Vec<ZlibCompressor>>,
    max_idle: usize,
    level: u32,
}

impl CompressorPool {
    pub fn new(config: &CompressorPoolConfig) -> Self {
        let idle = (0..config.min_idle.min(config.max_total))
            .map(|_| ZlibCompressor::new(config.level))
            .collect();
        Self {
            permits: Semaphore::new(config.max_total),
            idle: Mutex::new(idle),
            max_idle: config.max_idle,
            level: config.level,
        }
    }

    /// Borrows a compressor, waiting if the pool is exhausted.
    ///
    /// The returned guard puts the compressor back when dropped, whatever the
    /// exit path.
    pub async fn acquire(&self) -> Result<PooledCompressor<'_>, PoolError> {
        let permit = self.permits.acquire().await.map_err(|_| PoolError::Closed)?;
        let compressor = self
            .idle
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| ZlibCompressor::new(self.level));
        Ok(PooledCompressor {
            pool: self,
            inner: Some(compressor),
            _permit: permit,
        })
    }

    /// Number of idle compressors currently parked in the pool.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().unwrap().len()
    }

    /// Permits still available for borrowing.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

/// RAII guard for a borrowed compressor.
pub struct PooledCompressor<'a> {
    pool: &'a CompressorPool,
    inner: Option<ZlibCompressor>,
    _permit: SemaphorePermit<'a>,
}

impl Deref for PooledCompressor<'_> {
    type Target = ZlibCompressor;

    fn deref(&self) -> &ZlibCompressor {
        self.inner.as_ref().expect("compressor present until drop")
    }
}

impl DerefMut for PooledCompressor<'_> {
    fn deref_mut(&mut self) -> &mut ZlibCompressor {
        self.inner.as_mut().expect("compressor present until drop")
    }
}

impl Drop for PooledCompressor<'_> {
    fn drop(&mut self) {
        if let Some(compressor) = self.inner.take() {
            let mut idle = self.pool.idle.lock().unwrap();
            if idle.len() < self.pool.max_idle {
                idle.push(compressor);
            }
        }
    }
}
