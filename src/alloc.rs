//! Process-wide task allocator (§4.A).
//!
//! Every allocation is prefixed by an [`AllocNode`] header that links it
//! into the process allocation list; the pointer handed back to callers
//! points just past that header, matching the original `IMalloc` layout.

use crate::list::{Links, List, Node};
use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::Mutex;

#[repr(C)]
struct AllocNode {
    links: Links<AllocNode>,
    size: usize,
    /// The layout this node's header+payload block was allocated with, so
    /// it can be deallocated (or realloc'd) correctly later.
    layout: Layout,
}

unsafe impl Node for AllocNode {
    fn links(&self) -> &Links<Self> {
        &self.links
    }
}

fn header_layout(payload_bytes: usize) -> Layout {
    let header = Layout::new::<AllocNode>();
    let (combined, _) = header
        .extend(Layout::array::<u8>(payload_bytes).expect("payload size overflow"))
        .expect("layout overflow");
    combined.pad_to_align()
}

fn payload_offset() -> usize {
    Layout::new::<AllocNode>().pad_to_align().size()
}

/// The process-wide task allocator singleton, exposing `alloc`/`realloc`/
/// `free`/`size_of`/`did_alloc`/`heap_minimize` (§4.A). `add_ref`/`release`
/// always report 1/0 respectively, because this object is never unloaded.
pub struct TaskAllocator {
    list: Mutex<List<AllocNode>>,
}

impl TaskAllocator {
    pub(crate) fn new() -> Self {
        TaskAllocator {
            list: Mutex::new(List::new()),
        }
    }

    /// Always reports 1 outstanding reference (§4.A).
    pub fn add_ref(&self) -> u32 {
        1
    }

    /// Always reports 0 remaining references (§4.A).
    pub fn release(&self) -> u32 {
        0
    }

    pub fn alloc(&self, n: usize) -> Option<NonNull<u8>> {
        let layout = header_layout(n);
        let raw = unsafe { alloc::alloc(layout) };
        let header = NonNull::new(raw as *mut AllocNode)?;
        unsafe {
            header.as_ptr().write(AllocNode {
                links: Links::new(),
                size: n,
                layout,
            });
        }
        let list = self.list.lock().unwrap();
        unsafe { list.add_tail(header) };
        drop(list);

        Some(unsafe { payload_ptr(header) })
    }

    /// Removes, reallocs, and reinserts under a single critical section, per
    /// §5 ("the entire sequence is atomic because the backing realloc may
    /// relocate").
    pub fn realloc(&self, p: NonNull<u8>, n: usize) -> Option<NonNull<u8>> {
        let old_header = unsafe { header_of(p) };
        let new_layout = header_layout(n);

        let list = self.list.lock().unwrap();
        unsafe { list.remove(old_header) };

        let old_layout = unsafe { old_header.as_ref() }.layout;
        let raw = unsafe {
            alloc::realloc(old_header.as_ptr() as *mut u8, old_layout, new_layout.size())
        };

        let Some(new_header) = NonNull::new(raw as *mut AllocNode) else {
            // realloc failed: the original block (and its contents) are
            // untouched by the standard library contract, so reinsert it.
            unsafe { list.add_tail(old_header) };
            return None;
        };

        unsafe {
            (*new_header.as_ptr()).links = Links::new();
            (*new_header.as_ptr()).size = n;
            (*new_header.as_ptr()).layout = new_layout;
        }
        unsafe { list.add_tail(new_header) };
        drop(list);

        Some(unsafe { payload_ptr(new_header) })
    }

    pub fn free(&self, p: NonNull<u8>) {
        let header = unsafe { header_of(p) };
        let list = self.list.lock().unwrap();
        unsafe { list.remove(header) };
        drop(list);

        let layout = unsafe { header.as_ref() }.layout;
        unsafe { alloc::dealloc(header.as_ptr() as *mut u8, layout) };
    }

    pub fn size_of(&self, p: NonNull<u8>) -> usize {
        unsafe { header_of(p).as_ref() }.size
    }

    /// Linear search of the allocation list for header-pointer equality.
    /// O(n) by design (§4.A): this is a diagnostic operation, not a hot path.
    pub fn did_alloc(&self, p: NonNull<u8>) -> bool {
        let header = unsafe { header_of(p) };
        let list = self.list.lock().unwrap();
        list.iter().any(|n| n == header)
    }

    pub fn heap_minimize(&self) {
        // No-op: the standard library provides no portable heap-trim hook.
    }

    /// Frees any headers still on the list. Called on the runtime init
    /// counter's 1→0 transition (a debugging leak sweep, not normal use).
    pub(crate) fn teardown(&self) {
        let list = self.list.lock().unwrap();
        while let Some(header) = unsafe { list.remove_head() } {
            let layout = unsafe { header.as_ref() }.layout;
            unsafe { alloc::dealloc(header.as_ptr() as *mut u8, layout) };
        }
    }
}

unsafe fn header_of(p: NonNull<u8>) -> NonNull<AllocNode> {
    let addr = p.as_ptr() as usize - payload_offset();
    unsafe { NonNull::new_unchecked(addr as *mut AllocNode) }
}

unsafe fn payload_ptr(header: NonNull<AllocNode>) -> NonNull<u8> {
    let addr = header.as_ptr() as usize + payload_offset();
    unsafe { NonNull::new_unchecked(addr as *mut u8) }
}
