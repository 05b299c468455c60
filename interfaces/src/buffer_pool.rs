//! Baseband Buffer Pool
//!
//! A fixed number of sample buffers of a fixed size, allocated up front. A
//! buffer is borrowed through a [`SampleBuffer`] handle and goes back to the
//! pool when the handle is dropped, so the radio path never allocates.

use crate::InterfaceError;
use num_complex::Complex32;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

struct PoolInner {
    free: Mutex<Vec<Vec<Complex32>>>,
    nof_buffers: usize,
    buffer_size: usize,
}

impl PoolInner {
    fn free_list(&self) -> MutexGuard<'_, Vec<Vec<Complex32>>> {
        // A poisoned lock only means a holder panicked; the list itself is intact.
        self.free.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Bounded pool of complex sample buffers
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    pub fn new(nof_buffers: usize, buffer_size: usize) -> Result<Self, InterfaceError> {
        if nof_buffers == 0 || buffer_size == 0 {
            return Err(InterfaceError::InvalidConfig(format!(
                "buffer pool needs at least one buffer of one sample, got {}x{}",
                nof_buffers, buffer_size
            )));
        }
        let free = (0..nof_buffers)
            .map(|_| vec![Complex32::new(0.0, 0.0); buffer_size])
            .collect();
        debug!("Buffer pool created: {} buffers of {} samples", nof_buffers, buffer_size);
        Ok(Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(free),
                nof_buffers,
                buffer_size,
            }),
        })
    }

    pub fn nof_buffers(&self) -> usize {
        self.inner.nof_buffers
    }

    pub fn buffer_size(&self) -> usize {
        self.inner.buffer_size
    }

    /// Buffers currently available
    pub fn available(&self) -> usize {
        self.inner.free_list().len()
    }

    /// Take a zeroed buffer, `None` when every buffer is in use
    pub fn try_acquire(&self) -> Option<SampleBuffer> {
        let mut samples = self.inner.free_list().pop()?;
        samples.fill(Complex32::new(0.0, 0.0));
        Some(SampleBuffer {
            samples: Some(samples),
            pool: Arc::clone(&self.inner),
        })
    }

    pub fn acquire(&self) -> Result<SampleBuffer, InterfaceError> {
        self.try_acquire().ok_or_else(|| {
            warn!("Buffer pool exhausted");
            InterfaceError::PoolExhausted(self.inner.nof_buffers)
        })
    }
}

/// A buffer on loan from a [`BufferPool`]
pub struct SampleBuffer {
    samples: Option<Vec<Complex32>>,
    pool: Arc<PoolInner>,
}

impl SampleBuffer {
    pub fn as_slice(&self) -> &[Complex32] {
        self.samples.as_deref().unwrap_or(&[])
    }

    pub fn as_mut_slice(&mut self) -> &mut [Complex32] {
        self.samples.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Deref for SampleBuffer {
    type Target = [Complex32];

    fn deref(&self) -> &[Complex32] {
        self.as_slice()
    }
}

impl DerefMut for SampleBuffer {
    fn deref_mut(&mut self) -> &mut [Complex32] {
        self.as_mut_slice()
    }
}

impl Drop for SampleBuffer {
    fn drop(&mut self) {
        if let Some(samples) = self.samples.take() {
            self.pool.free_list().push(samples);
        }
    }
}

impl std::fmt::Debug for SampleBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleBuffer").field("len", &self.len()).finish()
    }
}
