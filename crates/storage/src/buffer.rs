use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, error};
use thiserror::Error;

use crate::frame::Frame;
use crate::page_table::PageTable;
use crate::replacer::{FrameId, LruReplacer, Replacer};
use crate::{DiskManager, INVALID_PAGE_ID, PageId};

/// Errors returned by the buffer pool manager.
#[derive(Debug, Error)]
pub enum BufferPoolError {
    /// The buffer pool latch was poisoned.
    #[error("buffer pool lock poisoned")]
    LockPoisoned,
    /// The underlying disk manager failed.
    #[error("disk manager error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for buffer pool results.
pub type BufferPoolResult<T> = Result<T, BufferPoolError>;

/// Guard that provides access to a pinned page while holding the pool
/// latch. Dropping the guard releases the latch but not the pin; pair
/// every `fetch_page`/`new_page` with exactly one `unpin_page`.
pub struct PageGuard<'a> {
    state: MutexGuard<'a, BufferPoolState>,
    frame_id: FrameId,
}

impl<'a> PageGuard<'a> {
    /// Returns the frame id backing this guard.
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }
}

impl Deref for PageGuard<'_> {
    type Target = Frame;

    fn deref(&self) -> &Self::Target {
        &self.state.frames[self.frame_id]
    }
}

impl DerefMut for PageGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.state.frames[self.frame_id]
    }
}

struct BufferPoolState {
    disk_manager: DiskManager,
    replacer: LruReplacer<FrameId>,
    frames: Vec<Frame>,
    page_table: PageTable,
    free_list: VecDeque<FrameId>,
}

impl Drop for BufferPoolState {
    // Destruction contract: every dirty page reaches disk before the
    // frames go away.
    fn drop(&mut self) {
        for frame in &self.frames {
            if let Some(page_id) = frame.page_id {
                if frame.is_dirty {
                    if let Err(err) = self.disk_manager.write_page(page_id, frame.data()) {
                        error!("failed to flush page {page_id} at shutdown: {err}");
                    }
                }
            }
        }
    }
}

#[derive(Default)]
struct BufferPoolMetrics {
    fetch_count: AtomicUsize,
}

/// Buffer pool manager: a fixed set of frames caching disk pages, with
/// pin counting, dirty tracking, and LRU eviction.
///
/// Every public operation serializes on a single latch, held across any
/// disk I/O the operation performs.
#[derive(Clone)]
pub struct BufferPoolManager {
    inner: Arc<Mutex<BufferPoolState>>,
    metrics: Arc<BufferPoolMetrics>,
}

/// Flush mode for buffer pool writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// Defer disk sync to later (default behavior).
    Lazy,
    /// Force the disk write to be synced.
    Force,
}

impl BufferPoolManager {
    /// Creates a buffer pool of `pool_size` frames over an open disk
    /// manager. All frames start on the free list.
    pub fn new(disk_manager: DiskManager, pool_size: usize) -> Self {
        assert!(pool_size > 0, "pool_size must be positive");
        let state = BufferPoolState {
            disk_manager,
            replacer: LruReplacer::with_capacity(pool_size),
            frames: vec![Frame::new(); pool_size],
            page_table: PageTable::new(),
            free_list: (0..pool_size).collect(),
        };
        Self {
            inner: Arc::new(Mutex::new(state)),
            metrics: Arc::new(BufferPoolMetrics::default()),
        }
    }

    /// Opens the page file at `path` and builds a pool over it.
    pub fn open<P: AsRef<Path>>(path: P, pool_size: usize) -> BufferPoolResult<Self> {
        Ok(Self::new(DiskManager::open(path)?, pool_size))
    }

    fn lock_state(&self) -> BufferPoolResult<MutexGuard<'_, BufferPoolState>> {
        self.inner.lock().map_err(|_| BufferPoolError::LockPoisoned)
    }

    /// Returns the number of page fetches since last reset.
    pub fn fetch_count(&self) -> usize {
        self.metrics.fetch_count.load(Ordering::Relaxed)
    }

    /// Resets the fetch counter to zero.
    pub fn reset_fetch_count(&self) {
        self.metrics.fetch_count.store(0, Ordering::Relaxed);
    }

    /// Draws a usable frame: free list first, then LRU eviction. `None`
    /// means every frame is pinned.
    fn acquire_frame(state: &mut BufferPoolState) -> BufferPoolResult<Option<FrameId>> {
        if let Some(frame_id) = state.free_list.pop_front() {
            debug_assert!(state.frames[frame_id].page_id.is_none());
            return Ok(Some(frame_id));
        }
        let frame_id = match state.replacer.victim() {
            Some(frame_id) => frame_id,
            None => return Ok(None),
        };
        Self::evict(state, frame_id)?;
        Ok(Some(frame_id))
    }

    /// Writes back a dirty victim and drops its mapping. The caller
    /// resets and reassigns the frame.
    fn evict(state: &mut BufferPoolState, frame_id: FrameId) -> BufferPoolResult<()> {
        let frame = &mut state.frames[frame_id];
        debug_assert_eq!(frame.pin_count, 0, "replacer victim still pinned");
        if let Some(old_page_id) = frame.page_id {
            if frame.is_dirty {
                debug!("evicting dirty page {old_page_id}, writing back");
                state.disk_manager.write_page(old_page_id, frame.data())?;
                frame.is_dirty = false;
            }
            state.page_table.remove(old_page_id);
        }
        Ok(())
    }

    /// Pins the page into a frame, reading it from disk on a miss.
    ///
    /// Returns `Ok(None)` for the invalid sentinel and when every frame
    /// is pinned.
    pub fn fetch_page(&self, page_id: PageId) -> BufferPoolResult<Option<PageGuard<'_>>> {
        if page_id == INVALID_PAGE_ID {
            return Ok(None);
        }
        self.metrics.fetch_count.fetch_add(1, Ordering::Relaxed);
        let mut state = self.lock_state()?;

        if let Some(frame_id) = state.page_table.find(page_id) {
            let frame = &mut state.frames[frame_id];
            frame.pin_count += 1;
            if frame.pin_count == 1 {
                // the frame was an eviction candidate until this pin
                state.replacer.erase(frame_id);
            }
            return Ok(Some(PageGuard { state, frame_id }));
        }

        let frame_id = match Self::acquire_frame(&mut state)? {
            Some(frame_id) => frame_id,
            None => return Ok(None),
        };
        {
            let state = &mut *state;
            let frame = &mut state.frames[frame_id];
            frame.reset();
            frame.page_id = Some(page_id);
            frame.pin_count = 1;
            state.disk_manager.read_page(page_id, frame.data_mut())?;
        }
        state.page_table.insert(page_id, frame_id);
        Ok(Some(PageGuard { state, frame_id }))
    }

    /// Allocates a fresh page and pins it into a frame. The frame is
    /// zero-filled, not read back from disk.
    ///
    /// Returns `Ok(None)` when every frame is pinned.
    pub fn new_page(&self) -> BufferPoolResult<Option<(PageId, PageGuard<'_>)>> {
        let mut state = self.lock_state()?;
        let frame_id = match Self::acquire_frame(&mut state)? {
            Some(frame_id) => frame_id,
            None => return Ok(None),
        };
        let page_id = state.disk_manager.allocate_page()?;
        {
            let frame = &mut state.frames[frame_id];
            frame.reset();
            frame.page_id = Some(page_id);
            frame.pin_count = 1;
        }
        state.page_table.insert(page_id, frame_id);
        Ok(Some((page_id, PageGuard { state, frame_id })))
    }

    /// Releases one pin and optionally marks the page dirty. The dirty
    /// flag is sticky: a later clean unpin does not clear it.
    ///
    /// Returns `false` when the page is not resident or was not pinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> BufferPoolResult<bool> {
        let mut state = self.lock_state()?;
        let frame_id = match state.page_table.find(page_id) {
            Some(frame_id) => frame_id,
            None => return Ok(false),
        };
        let frame = &mut state.frames[frame_id];
        if frame.pin_count == 0 {
            return Ok(false);
        }
        if is_dirty {
            frame.is_dirty = true;
        }
        frame.pin_count -= 1;
        if frame.pin_count == 0 {
            state.replacer.insert(frame_id);
        }
        Ok(true)
    }

    /// Flushes a dirty resident page to disk.
    ///
    /// Returns `false` for the invalid sentinel, a non-resident page, or
    /// a clean page.
    pub fn flush_page(&self, page_id: PageId) -> BufferPoolResult<bool> {
        self.flush_page_with_mode(page_id, FlushMode::Lazy)
    }

    pub fn flush_page_with_mode(&self, page_id: PageId, mode: FlushMode) -> BufferPoolResult<bool> {
        if page_id == INVALID_PAGE_ID {
            return Ok(false);
        }
        let mut state = self.lock_state()?;
        let frame_id = match state.page_table.find(page_id) {
            Some(frame_id) => frame_id,
            None => return Ok(false),
        };
        if !state.frames[frame_id].is_dirty {
            return Ok(false);
        }
        let state = &mut *state;
        let frame = &mut state.frames[frame_id];
        state.disk_manager.write_page(page_id, frame.data())?;
        frame.is_dirty = false;
        if mode == FlushMode::Force {
            state.disk_manager.sync_data()?;
        }
        Ok(true)
    }

    /// Flushes every dirty resident page to disk.
    pub fn flush_all_pages(&self) -> BufferPoolResult<()> {
        self.flush_all_pages_with_mode(FlushMode::Lazy)
    }

    pub fn flush_all_pages_with_mode(&self, mode: FlushMode) -> BufferPoolResult<()> {
        let mut state = self.lock_state()?;
        let state = &mut *state;
        let mut flushed = 0usize;
        for frame in state.frames.iter_mut() {
            let page_id = match frame.page_id {
                Some(page_id) if frame.is_dirty => page_id,
                _ => continue,
            };
            state.disk_manager.write_page(page_id, frame.data())?;
            frame.is_dirty = false;
            flushed += 1;
        }
        if mode == FlushMode::Force && flushed > 0 {
            state.disk_manager.sync_data()?;
        }
        debug!("flushed {flushed} dirty pages");
        Ok(())
    }

    /// Deletes an unpinned resident page: drops it from the pool and
    /// deallocates it on disk.
    ///
    /// Returns `false`, leaving all state untouched, when the page is
    /// not resident or still pinned.
    pub fn delete_page(&self, page_id: PageId) -> BufferPoolResult<bool> {
        let mut state = self.lock_state()?;
        let frame_id = match state.page_table.find(page_id) {
            Some(frame_id) => frame_id,
            None => return Ok(false),
        };
        if state.frames[frame_id].pin_count > 0 {
            return Ok(false);
        }
        state.page_table.remove(page_id);
        state.replacer.erase(frame_id);
        state.disk_manager.deallocate_page(page_id)?;
        state.frames[frame_id].reset();
        state.free_list.push_back(frame_id);
        Ok(true)
    }

    /// Frames obtainable without displacing a pinned page: the free list
    /// plus the eviction candidates.
    pub fn free_frame_count(&self) -> BufferPoolResult<usize> {
        let state = self.lock_state()?;
        Ok(state.free_list.len() + state.replacer.size())
    }

    /// Pin count of a resident page, or `None` if it is not resident.
    pub fn pin_count_of(&self, page_id: PageId) -> BufferPoolResult<Option<u32>> {
        let state = self.lock_state()?;
        Ok(state
            .page_table
            .find(page_id)
            .map(|frame_id| state.frames[frame_id].pin_count))
    }
}
