//! Scratch buffers for path joining.
//!
//! Every trie operation joins the handle prefix with the caller's path, and
//! ingestion joins parent and child keys at every level. Allocating a fresh
//! `String` for each join makes deep documents quadratic, so joins borrow a
//! buffer from a size-class pool and hand it back when the guard drops.
//!
//! Size classes are powers of two from 32 bytes to 64 KiB; each class keeps
//! a bounded free list. Larger requests are served unpooled.

use std::ops::{Deref, DerefMut};
use std::sync::OnceLock;

use parking_lot::Mutex;

const MIN_CLASS_SHIFT: u32 = 5;
const NUM_CLASSES: usize = 12;
const MAX_PER_CLASS: usize = 32;

/// Size-class keyed pool of reusable `String` buffers.
pub struct BufferPool {
    /// Free lists by class index; class `i` holds buffers of capacity
    /// at least `32 << i`.
    classes: [Mutex<Vec<String>>; NUM_CLASSES],
}

impl BufferPool {
    pub fn new() -> Self {
        Self {
            classes: std::array::from_fn(|_| Mutex::new(Vec::new())),
        }
    }

    /// Process-wide pool used by [`Trie`](crate::Trie).
    pub fn global() -> &'static BufferPool {
        static POOL: OnceLock<BufferPool> = OnceLock::new();
        POOL.get_or_init(BufferPool::new)
    }

    #[inline]
    fn class_of(capacity: usize) -> Option<usize> {
        let size = capacity.max(1).next_power_of_two();
        let idx = size.trailing_zeros().saturating_sub(MIN_CLASS_SHIFT) as usize;
        (idx < NUM_CLASSES).then_some(idx)
    }

    #[inline]
    fn class_size(idx: usize) -> usize {
        1usize << (idx as u32 + MIN_CLASS_SHIFT)
    }

    /// Borrow an empty buffer able to hold at least `capacity` bytes.
    pub fn acquire(&self, capacity: usize) -> PooledBuf<'_> {
        let buf = match Self::class_of(capacity) {
            Some(idx) => self.classes[idx]
                .lock()
                .pop()
                .unwrap_or_else(|| String::with_capacity(Self::class_size(idx))),
            None => String::with_capacity(capacity),
        };
        debug_assert!(buf.is_empty());
        PooledBuf { buf, pool: self }
    }

    fn release(&self, mut buf: String) {
        // A buffer is filed under the largest class it can fully serve.
        let cap = buf.capacity();
        if cap < Self::class_size(0) {
            return;
        }
        let idx = ((usize::BITS - 1 - cap.leading_zeros()).saturating_sub(MIN_CLASS_SHIFT)) as usize;
        if idx >= NUM_CLASSES {
            return;
        }
        buf.clear();
        let mut list = self.classes[idx].lock();
        if list.len() < MAX_PER_CLASS {
            list.push(buf);
        }
    }

    /// Number of idle buffers across all classes.
    pub fn idle(&self) -> usize {
        self.classes.iter().map(|c| c.lock().len()).sum()
    }

    /// Join `prefix` and `path` with `delimiter` into a pooled buffer.
    ///
    /// An empty side contributes nothing, and no delimiter is inserted when
    /// either side already carries one at the seam.
    pub fn join(&self, prefix: &str, path: &str, delimiter: char) -> PooledBuf<'_> {
        let mut out = self.acquire(prefix.len() + path.len() + delimiter.len_utf8());
        push_segment(&mut out, prefix, delimiter);
        push_segment(&mut out, path, delimiter);
        out
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Append `segment` to `buf`, adding `delimiter` at the seam when needed.
pub(crate) fn push_segment(buf: &mut String, segment: &str, delimiter: char) {
    if segment.is_empty() {
        return;
    }
    if !buf.is_empty() && !buf.ends_with(delimiter) && !segment.starts_with(delimiter) {
        buf.push(delimiter);
    }
    buf.push_str(segment);
}

/// A borrowed scratch buffer; returns to its pool on drop.
pub struct PooledBuf<'p> {
    buf: String,
    pool: &'p BufferPool,
}

impl PooledBuf<'_> {
    pub fn as_str(&self) -> &str {
        &self.buf
    }
}

impl Deref for PooledBuf<'_> {
    type Target = String;

    fn deref(&self) -> &String {
        &self.buf
    }
}

impl DerefMut for PooledBuf<'_> {
    fn deref_mut(&mut self) -> &mut String {
        &mut self.buf
    }
}

impl Drop for PooledBuf<'_> {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buf));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_rules() {
        let pool = BufferPool::new();
        assert_eq!(pool.join("", "a.b", '.').as_str(), "a.b");
        assert_eq!(pool.join("app", "", '.').as_str(), "app");
        assert_eq!(pool.join("app", "debug", '.').as_str(), "app.debug");
        assert_eq!(pool.join("app.", "debug", '.').as_str(), "app.debug");
        assert_eq!(pool.join("/about-us", "/team", '/').as_str(), "/about-us/team");
        assert_eq!(pool.join("", "", '.').as_str(), "");
    }

    #[test]
    fn test_buffers_are_reused() {
        let pool = BufferPool::new();
        assert_eq!(pool.idle(), 0);
        {
            let mut buf = pool.acquire(10);
            buf.push_str("hello");
            assert!(buf.capacity() >= 32);
        }
        assert_eq!(pool.idle(), 1);

        let buf = pool.acquire(20);
        assert!(buf.is_empty(), "released buffers come back cleared");
        assert_eq!(pool.idle(), 0);
        drop(buf);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn test_grown_buffer_files_under_larger_class() {
        let pool = BufferPool::new();
        {
            let mut buf = pool.acquire(1);
            buf.push_str(&"x".repeat(200));
        }
        assert_eq!(pool.idle(), 1);
        let reused = pool.acquire(100);
        assert!(reused.capacity() >= 200, "grown buffer should serve the 128 class");
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn test_oversized_requests_bypass_pool() {
        let pool = BufferPool::new();
        drop(pool.acquire(1 << 20));
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn test_concurrent_borrow_return() {
        let pool = BufferPool::new();
        std::thread::scope(|s| {
            for t in 0..4 {
                let pool = &pool;
                s.spawn(move || {
                    for i in 0..200 {
                        let joined = pool.join("thread", &format!("{t}.{i}"), '.');
                        assert!(joined.starts_with("thread."));
                    }
                });
            }
        });
        assert!(pool.idle() <= MAX_PER_CLASS * NUM_CLASSES);
    }
}
