//! Independently owned copies of column bytes, and their hand-off to a host runtime.
//!
//! Every path that turns column storage into a binary value goes through
//! [`ColumnBuffer::materialize`]: one allocation of exactly `length` bytes, one copy, and one
//! release when the buffer is dropped. Host runtimes that adopt raw memory get the allocation
//! through [`ColumnBuffer::into_raw`] and hand it back through [`RawBuffer::release`].
use std::{fmt, os::raw::c_void, sync::Arc};

use crate::{Error, Result};

/// Observer run once, with the buffer length, when the allocation is freed.
pub type ReleaseHook = Box<dyn FnOnce(usize) + Send>;

pub struct ColumnBuffer {
    bytes: Box<[u8]>,
    on_release: Option<ReleaseHook>,
}

impl ColumnBuffer {
    /// Copy `storage[offset..offset + length]` into a new allocation.
    ///
    /// The result never aliases `storage`; it stays valid after the storage is reused or freed.
    pub fn materialize(storage: &[u8], offset: usize, length: usize) -> Result<Self> {
        let end = offset
            .checked_add(length)
            .filter(|&end| end <= storage.len())
            .ok_or(Error::BufferRange {
                offset,
                length,
                available: storage.len(),
            })?;
        Ok(Self {
            bytes: Box::from(&storage[offset..end]),
            on_release: None,
        })
    }

    pub fn with_release_hook(mut self, hook: impl FnOnce(usize) + Send + 'static) -> Self {
        self.on_release = Some(Box::new(hook));
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Give up ownership in the `(data, length, release, hint)` convention of C buffer hosts.
    ///
    /// The host must call [`RawBuffer::release`] (or `release` with `data` and `hint`) exactly
    /// once; until then `data` stays valid.
    pub fn into_raw(self) -> RawBuffer {
        let len = self.len();
        let mut boxed = Box::new(self);
        let data = boxed.bytes.as_mut_ptr();
        RawBuffer {
            data,
            len,
            release: release_raw,
            hint: Box::into_raw(boxed).cast(),
        }
    }
}

impl Drop for ColumnBuffer {
    fn drop(&mut self) {
        if let Some(hook) = self.on_release.take() {
            hook(self.bytes.len());
        }
    }
}

impl fmt::Debug for ColumnBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnBuffer")
            .field("len", &self.bytes.len())
            .field("has_release_hook", &self.on_release.is_some())
            .finish()
    }
}

/// A [`ColumnBuffer`] handed across a C boundary.
#[repr(C)]
#[derive(Debug)]
pub struct RawBuffer {
    pub data: *mut u8,
    pub len: usize,
    pub release: unsafe extern "C" fn(*mut u8, *mut c_void),
    pub hint: *mut c_void,
}

impl RawBuffer {
    /// Free the buffer through its own release callback.
    ///
    /// # Safety
    ///
    /// Must be called at most once, and not after the host already invoked `release`.
    pub unsafe fn release(self) {
        (self.release)(self.data, self.hint)
    }
}

/// Release callback paired with [`ColumnBuffer::into_raw`]. `hint` owns the buffer.
///
/// # Safety
///
/// `hint` must come from `into_raw` and must not be released twice.
pub unsafe extern "C" fn release_raw(_data: *mut u8, hint: *mut c_void) {
    if hint.is_null() {
        return;
    }
    drop(Box::from_raw(hint.cast::<ColumnBuffer>()));
}

/// Receiver of materialized buffers on the host side.
pub trait BufferHost {
    type Handle;

    fn expose_buffer(&mut self, buffer: ColumnBuffer) -> Self::Handle;
}

/// C-style hosts: anything that adopts a [`RawBuffer`].
impl<F, H> BufferHost for F
where
    F: FnMut(RawBuffer) -> H,
{
    type Handle = H;

    fn expose_buffer(&mut self, buffer: ColumnBuffer) -> H {
        self(buffer.into_raw())
    }
}

// -------------------------- BinaryColumn --------------------------

/// A binary result column: a window over shared row storage read back from the driver.
#[derive(Debug, Clone)]
pub struct BinaryColumn {
    id: usize,
    storage: Arc<[u8]>,
    offset: usize,
    len: usize,
}

impl BinaryColumn {
    pub fn new(id: usize, storage: Arc<[u8]>, len: usize) -> Self {
        Self::with_offset(id, storage, 0, len)
    }

    pub fn with_offset(id: usize, storage: Arc<[u8]>, offset: usize, len: usize) -> Self {
        Self {
            id,
            storage,
            offset,
            len,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn to_buffer(&self) -> Result<ColumnBuffer> {
        ColumnBuffer::materialize(&self.storage, self.offset, self.len)
    }

    /// Materialize and hand the copy to `host`.
    pub fn to_value<H: BufferHost + ?Sized>(&self, host: &mut H) -> Result<H::Handle> {
        let buffer = self.to_buffer()?;
        tracing::trace!(column = self.id, len = buffer.len(), "exposing binary column");
        Ok(host.expose_buffer(buffer))
    }
}
