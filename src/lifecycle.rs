//! Process init/teardown lifecycle (§4.U).
//!
//! A single process-wide nesting counter gates the three mutex-guarded
//! singletons (§5): the first `initialize()` constructs the [`TaskAllocator`]
//! and [`LibraryManager`] behind a dedicated init mutex; the matching
//! `uninitialize()` at counter 1→0 tears the allocator down (freeing any
//! still-outstanding allocations, a debugging leak sweep) and drops the
//! library manager after sweeping unused libraries.

use crate::alloc::TaskAllocator;
use crate::config::RuntimeConfig;
use crate::library::LibraryManager;
use std::sync::{Mutex, OnceLock};

struct Singletons {
    allocator: TaskAllocator,
    library_manager: LibraryManager<'static>,
}

// Lock ordering, documented once here (§5): `INIT_LOCK` is always acquired
// first and released last, outside of any lock the allocator or library
// manager themselves take. Callers never hold the init lock while blocking
// on the allocator's or library manager's own mutex from a different thread
// in a conflicting order.
static INIT_LOCK: Mutex<u32> = Mutex::new(0);
static CONFIG: OnceLock<RuntimeConfig> = OnceLock::new();
static SINGLETONS: OnceLock<Singletons> = OnceLock::new();

/// Increments the process init counter; on the 0→1 transition, constructs
/// the task allocator and library manager using `config` (ignored on later
/// nested calls, matching the original's one-shot config capture).
pub fn initialize(config: RuntimeConfig) {
    let mut count = INIT_LOCK.lock().unwrap();
    if *count == 0 {
        let config = CONFIG.get_or_init(|| config);
        let _ = SINGLETONS.get_or_init(|| Singletons {
            allocator: TaskAllocator::new(),
            library_manager: LibraryManager::new(config),
        });
        log::info!("runtime initialized");
    }
    *count += 1;
}

/// Decrements the process init counter; on the 1→0 transition, sweeps and
/// unloads every library reporting `can_unload_now`, then tears down the
/// task allocator (freeing any leaked allocations). Calling this more times
/// than `initialize()` is a logic error the original leaves undefined; this
/// port simply saturates at zero.
pub fn uninitialize() {
    let mut count = INIT_LOCK.lock().unwrap();
    if *count == 0 {
        return;
    }
    *count -= 1;
    if *count == 0 {
        if let Some(singletons) = SINGLETONS.get() {
            singletons.library_manager.free_unused_libraries();
            singletons.allocator.teardown();
        }
        log::info!("runtime uninitialized");
    }
}

/// Sweeps every cached library, unloading those reporting
/// `can_unload_now() == true` (§4.U). A no-op before the first
/// `initialize()`.
pub fn free_unused_libraries() {
    if let Some(singletons) = SINGLETONS.get() {
        singletons.library_manager.free_unused_libraries();
    }
}

/// Returns the process task allocator, if the runtime has been initialized.
pub fn task_allocator() -> Option<&'static TaskAllocator> {
    SINGLETONS.get().map(|s| &s.allocator)
}

/// Returns the process library manager, if the runtime has been initialized.
pub fn library_manager() -> Option<&'static LibraryManager<'static>> {
    SINGLETONS.get().map(|s| &s.library_manager)
}

/// Returns the process runtime configuration, if the runtime has been
/// initialized.
pub fn config() -> Option<&'static RuntimeConfig> {
    CONFIG.get()
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests share process-global state with every other test in the
    // crate that touches the lifecycle singletons, so they are serialized
    // through a single dedicated mutex rather than relying on test-runner
    // isolation.
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn nested_initialize_only_constructs_once() {
        let _guard = TEST_LOCK.lock().unwrap();
        initialize(RuntimeConfig::default());
        initialize(RuntimeConfig::default());
        assert!(task_allocator().is_some());
        assert!(library_manager().is_some());
        uninitialize();
        // Still initialized: only one of the two nested calls has unwound.
        assert!(task_allocator().is_some());
        uninitialize();
    }
}
