//! Per-stage scratch buffers reused across frames.
//!
//! Buffers are keyed by image size and pipeline stage. A [`PooledBuffer`]
//! hands its storage back to the pool when dropped, so a frame that aborts
//! half way releases everything it acquired.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, PoisonError};

use crate::source::Channel;

/// Pipeline stage that owns a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Pupil,
    Grating,
    LensPoints,
    Merge,
    ComplexAperture,
    Magnitude,
    Transpose,
    SpectralPsf(Channel),
    PsfSpectrum(Channel),
    Convolved(Channel),
    LightField,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferKey {
    pub width: usize,
    pub height: usize,
    pub stage: Stage,
}

impl BufferKey {
    pub fn new(width: usize, height: usize, stage: Stage) -> Self {
        Self {
            width,
            height,
            stage,
        }
    }
}

/// Free lists of buffers, one list per key.
pub struct BufferPool<T> {
    free: Mutex<HashMap<BufferKey, Vec<Vec<T>>>>,
}

impl<T: Clone + Default> BufferPool<T> {
    pub fn new() -> Self {
        Self {
            free: Mutex::new(HashMap::new()),
        }
    }

    /// Take a zero-filled buffer of `len` elements for `key`.
    pub fn acquire(&self, key: BufferKey, len: usize) -> PooledBuffer<'_, T> {
        let recycled = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&key)
            .and_then(Vec::pop);

        let data = match recycled {
            Some(mut data) => {
                data.clear();
                data.resize(len, T::default());
                data
            }
            None => vec![T::default(); len],
        };

        PooledBuffer {
            pool: self,
            key,
            data: Some(data),
        }
    }

    /// Drop every cached buffer. Called when the image dimensions change.
    pub fn clear(&self) {
        self.free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of idle buffers currently cached.
    pub fn cached(&self) -> usize {
        self.free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }

    fn release(&self, key: BufferKey, data: Vec<T>) {
        self.free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_default()
            .push(data);
    }
}

impl<T: Clone + Default> Default for BufferPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped handle to a pooled buffer.
pub struct PooledBuffer<'a, T: Clone + Default> {
    pool: &'a BufferPool<T>,
    key: BufferKey,
    data: Option<Vec<T>>,
}

impl<T: Clone + Default> PooledBuffer<'_, T> {
    pub fn key(&self) -> BufferKey {
        self.key
    }

    /// Detach the storage from the pool, e.g. to hand it to the caller.
    pub fn into_vec(mut self) -> Vec<T> {
        self.data.take().unwrap_or_default()
    }
}

impl<T: Clone + Default> Deref for PooledBuffer<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.data.as_deref().unwrap_or(&[])
    }
}

impl<T: Clone + Default> DerefMut for PooledBuffer<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.data.as_deref_mut().unwrap_or(&mut [])
    }
}

impl<T: Clone + Default> Drop for PooledBuffer<'_, T> {
    fn drop(&mut self) {
        if let Some(data) = self.data.take() {
            self.pool.release(self.key, data);
        }
    }
}
