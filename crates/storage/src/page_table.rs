use std::collections::HashMap;

use crate::PageId;
use crate::replacer::FrameId;

/// Mapping from resident page ids to the frames holding them.
///
/// Keys are unique; the buffer pool latch serializes all access, so no
/// internal synchronization is needed here.
#[derive(Debug, Default)]
pub(crate) struct PageTable {
    entries: HashMap<PageId, FrameId>,
}

impl PageTable {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Returns the frame holding `page_id`, if resident.
    pub(crate) fn find(&self, page_id: PageId) -> Option<FrameId> {
        self.entries.get(&page_id).copied()
    }

    /// Establishes a mapping. Overwriting a live key is a buffer pool bug.
    pub(crate) fn insert(&mut self, page_id: PageId, frame_id: FrameId) {
        let previous = self.entries.insert(page_id, frame_id);
        debug_assert!(previous.is_none(), "page {page_id} was already mapped");
    }

    /// Removes the mapping for `page_id`, reporting whether it existed.
    pub(crate) fn remove(&mut self, page_id: PageId) -> bool {
        self.entries.remove(&page_id).is_some()
    }
}
