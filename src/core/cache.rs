//! Swappable buffer cache.
//!
//! Lightmap buffers can be large, so each sector bakes against a
//! [`SwapCache`] with a resident-byte budget. Buffers are allocated lazily
//! on first lock. When a materialization pushes the cache over budget,
//! unlocked buffers are written to swap files and dropped from memory; the
//! next [`SwapBuffer::lock`] reads them back.

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use bytemuck::Pod;
use parking_lot::{Mutex, MutexGuard};

use crate::util::{Error, Result};

/// Something the cache can push out of memory.
trait Evict: Send + Sync {
    fn id(&self) -> u64;
    /// Evict if resident and not locked. Returns freed bytes.
    fn try_evict(&self) -> Result<usize>;
}

/// Thread-safe registry of swappable buffers sharing one memory budget.
///
/// Uses `parking_lot::Mutex` for the registry and `AtomicUsize` for
/// lock-free size tracking.
pub struct SwapCache {
    tag: String,
    dir: PathBuf,
    max_resident: usize,
    resident: AtomicUsize,
    next_id: AtomicU64,
    evictions: AtomicUsize,
    entries: Mutex<Vec<Weak<dyn Evict>>>,
}

impl SwapCache {
    /// Create a cache writing swap files into `dir`; `tag` keeps file names of
    /// concurrent caches apart.
    pub fn new(dir: impl Into<PathBuf>, max_resident: usize, tag: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            tag: tag.into(),
            dir: dir.into(),
            max_resident,
            resident: AtomicUsize::new(0),
            next_id: AtomicU64::new(0),
            evictions: AtomicUsize::new(0),
            entries: Mutex::new(Vec::new()),
        })
    }

    /// Get current resident size in bytes.
    #[inline]
    pub fn resident_bytes(&self) -> usize {
        self.resident.load(Ordering::Relaxed)
    }

    /// Get maximum resident size in bytes.
    #[inline]
    pub fn max_resident(&self) -> usize {
        self.max_resident
    }

    /// Number of buffers written out so far.
    #[inline]
    pub fn evictions(&self) -> usize {
        self.evictions.load(Ordering::Relaxed)
    }

    fn register(&self, entry: Weak<dyn Evict>) {
        self.entries.lock().push(entry);
    }

    fn swap_path(&self, id: u64) -> PathBuf {
        self.dir.join(format!("lightbake-{}-{}-{}.swap", std::process::id(), self.tag, id))
    }

    /// Account for newly resident bytes, evicting other buffers while over
    /// budget. Buffer `keep` is the one being materialized.
    fn add_resident(&self, bytes: usize, keep: u64) -> Result<()> {
        let current = self.resident.fetch_add(bytes, Ordering::Relaxed) + bytes;
        if current <= self.max_resident {
            return Ok(());
        }

        let mut entries = self.entries.lock();
        entries.retain(|e| e.strong_count() > 0);
        for entry in entries.iter() {
            if self.resident_bytes() <= self.max_resident {
                break;
            }
            let Some(buffer) = entry.upgrade() else { continue };
            if buffer.id() == keep {
                continue;
            }
            if buffer.try_evict()? > 0 {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    fn sub_resident(&self, bytes: usize) {
        let _ = self.resident.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |x| {
            Some(x.saturating_sub(bytes))
        });
    }
}

enum Residency<T> {
    Unallocated,
    Resident(Vec<T>),
    Swapped(PathBuf),
}

/// Fixed-length buffer that may live in memory or in a swap file.
pub struct SwapBuffer<T: Pod + Send> {
    id: u64,
    len: usize,
    cache: Arc<SwapCache>,
    state: Mutex<Residency<T>>,
}

impl<T: Pod + Send> SwapBuffer<T> {
    /// Create an unallocated buffer of `len` zeroed elements.
    pub fn new(cache: &Arc<SwapCache>, len: usize) -> Arc<Self> {
        let id = cache.next_id.fetch_add(1, Ordering::Relaxed);
        let buffer = Arc::new(Self {
            id,
            len,
            cache: Arc::clone(cache),
            state: Mutex::new(Residency::Unallocated),
        });
        let weak: Weak<dyn Evict> = Arc::downgrade(&buffer) as Weak<dyn Evict>;
        cache.register(weak);
        buffer
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    fn byte_size(&self) -> usize {
        self.len * std::mem::size_of::<T>()
    }

    /// True if the data is currently in memory.
    pub fn is_resident(&self) -> bool {
        matches!(*self.state.lock(), Residency::Resident(_))
    }

    /// Acquire the buffer, reading it back from disk if it was evicted.
    ///
    /// The buffer stays resident until the guard is dropped.
    pub fn lock(&self) -> Result<SwapGuard<'_, T>> {
        let mut state = self.state.lock();
        let materialized = match &*state {
            Residency::Resident(_) => false,
            Residency::Unallocated => {
                *state = Residency::Resident(vec![T::zeroed(); self.len]);
                true
            }
            Residency::Swapped(path) => {
                let mut data = vec![T::zeroed(); self.len];
                File::open(path)
                    .and_then(|mut f| f.read_exact(bytemuck::cast_slice_mut(&mut data)))
                    .map_err(|e| Error::swap(format!("{}: {e}", path.display())))?;
                let _ = std::fs::remove_file(path);
                *state = Residency::Resident(data);
                true
            }
        };
        if materialized {
            self.cache.add_resident(self.byte_size(), self.id)?;
        }
        Ok(SwapGuard { state })
    }
}

impl<T: Pod + Send> Evict for SwapBuffer<T> {
    fn id(&self) -> u64 {
        self.id
    }

    fn try_evict(&self) -> Result<usize> {
        let Some(mut state) = self.state.try_lock() else {
            return Ok(0);
        };
        let Residency::Resident(data) = &*state else {
            return Ok(0);
        };
        let path = self.cache.swap_path(self.id);
        std::fs::write(&path, bytemuck::cast_slice::<T, u8>(data))
            .map_err(|e| Error::swap(format!("{}: {e}", path.display())))?;
        *state = Residency::Swapped(path);
        let bytes = self.byte_size();
        self.cache.sub_resident(bytes);
        tracing::debug!(buffer = self.id, bytes, "evicted buffer to swap");
        Ok(bytes)
    }
}

impl<T: Pod + Send> Drop for SwapBuffer<T> {
    fn drop(&mut self) {
        let bytes = self.byte_size();
        match &*self.state.get_mut() {
            Residency::Resident(_) => self.cache.sub_resident(bytes),
            Residency::Swapped(path) => {
                let _ = std::fs::remove_file(path);
            }
            Residency::Unallocated => {}
        }
    }
}

/// Scoped access to a resident [`SwapBuffer`].
pub struct SwapGuard<'a, T> {
    state: MutexGuard<'a, Residency<T>>,
}

impl<T> std::ops::Deref for SwapGuard<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        match &*self.state {
            Residency::Resident(data) => data,
            _ => &[],
        }
    }
}

impl<T> std::ops::DerefMut for SwapGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        match &mut *self.state {
            Residency::Resident(data) => data,
            _ => &mut [],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lazy_allocation() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SwapCache::new(dir.path(), 1024, "t");
        let buf = SwapBuffer::<f32>::new(&cache, 16);
        assert!(!buf.is_resident());
        assert_eq!(cache.resident_bytes(), 0);
        {
            let data = buf.lock().unwrap();
            assert_eq!(data.len(), 16);
            assert!(data.iter().all(|&x| x == 0.0));
        }
        assert!(buf.is_resident());
        assert_eq!(cache.resident_bytes(), 64);
    }

    #[test]
    fn test_evict_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        // Room for exactly one buffer of 16 floats.
        let cache = SwapCache::new(dir.path(), 64, "t");
        let a = SwapBuffer::<f32>::new(&cache, 16);
        let b = SwapBuffer::<f32>::new(&cache, 16);

        a.lock().unwrap()[3] = 7.5;
        b.lock().unwrap()[0] = 1.0;
        assert!(!a.is_resident(), "a should have been evicted by b");
        assert_eq!(cache.evictions(), 1);

        let restored = a.lock().unwrap();
        assert_eq!(restored[3], 7.5);
    }

    #[test]
    fn test_locked_buffer_not_evicted() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SwapCache::new(dir.path(), 64, "t");
        let a = SwapBuffer::<f32>::new(&cache, 16);
        let b = SwapBuffer::<f32>::new(&cache, 16);

        let mut guard = a.lock().unwrap();
        guard[0] = 2.0;
        let _ = b.lock().unwrap();
        assert_eq!(guard[0], 2.0);
        assert_eq!(cache.evictions(), 0);
    }

    #[test]
    fn test_drop_removes_swap_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SwapCache::new(dir.path(), 64, "t");
        let a = SwapBuffer::<f32>::new(&cache, 16);
        let b = SwapBuffer::<f32>::new(&cache, 16);
        let _ = a.lock().unwrap();
        let _ = b.lock().unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
        drop(a);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
