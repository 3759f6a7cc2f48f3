//! Secret buffers that stay off the swap file.
//!
//! A [`SecretBuffer`] owns its allocation, locks the pages with `mlock()`
//! where the platform supports it, and zeroes the contents on drop. Locking
//! failures degrade gracefully: they are logged and the buffer still
//! zeroes on drop.

use zeroize::Zeroize;

/// Result of a memory lock attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LockResult {
    /// Pages were locked.
    Locked,
    /// Locking failed; warning logged, operation continues.
    Failed,
    /// Locking is not supported on this platform.
    Unsupported,
}

/// An owned byte buffer that is page-locked while alive and zeroed on drop.
pub struct SecretBuffer {
    bytes: Vec<u8>,
    lock: LockResult,
}

impl SecretBuffer {
    /// Take ownership of `bytes` and lock their pages.
    pub fn new(bytes: Vec<u8>) -> Self {
        let lock = if bytes.is_empty() {
            LockResult::Locked
        } else {
            // SAFETY: the vec's allocation is valid for its length and is
            // not moved for the lifetime of this buffer.
            unsafe { lock_pages(bytes.as_ptr(), bytes.len()) }
        };
        Self { bytes, lock }
    }

    /// Copy a string into a fresh locked buffer.
    pub fn from_str(s: &str) -> Self {
        Self::new(s.as_bytes().to_vec())
    }

    /// View the secret bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Whether the pages were actually locked.
    pub fn is_locked(&self) -> bool {
        self.lock == LockResult::Locked
    }
}

impl Drop for SecretBuffer {
    fn drop(&mut self) {
        if self.lock == LockResult::Locked && !self.bytes.is_empty() {
            // SAFETY: same allocation that was locked in `new`.
            unsafe { unlock_pages(self.bytes.as_ptr(), self.bytes.len()) };
        }
        self.bytes.zeroize();
    }
}

#[cfg(unix)]
unsafe fn lock_pages(ptr: *const u8, len: usize) -> LockResult {
    if libc::mlock(ptr as *const libc::c_void, len) == 0 {
        tracing::debug!("locked {} bytes of secret memory", len);
        LockResult::Locked
    } else {
        let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
        tracing::warn!(
            "failed to lock secret memory (errno {}); secrets may hit swap",
            errno
        );
        LockResult::Failed
    }
}

#[cfg(unix)]
unsafe fn unlock_pages(ptr: *const u8, len: usize) {
    if libc::munlock(ptr as *const libc::c_void, len) != 0 {
        tracing::debug!("munlock returned non-zero (likely already unlocked)");
    }
}

#[cfg(not(unix))]
unsafe fn lock_pages(_ptr: *const u8, _len: usize) -> LockResult {
    tracing::warn!("memory locking not supported on this platform");
    LockResult::Unsupported
}

#[cfg(not(unix))]
unsafe fn unlock_pages(_ptr: *const u8, _len: usize) {}
