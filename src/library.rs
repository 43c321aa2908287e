//! Dynamic-library manager (§4.D).
//!
//! One node per distinct canonical path, load-count deduplicated. The
//! platform open/resolve-symbol/close primitives themselves are supplied by
//! `libloading` (§1 names these as an external collaborator); everything
//! else — caching, load counts, init/teardown-symbol invocation — is this
//! module's own bookkeeping, mirroring `gCoLoadDLL`/`gCoUnloadDLL` in spirit.

use crate::config::RuntimeConfig;
use crate::error::Error;
use crate::guid::Guid;
use crate::list::{Links, List, Node};
use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::Mutex;

type DllGetClassObjectFn =
    unsafe extern "C" fn(*const Guid, *const Guid, *mut *mut c_void) -> u32;
type DllCanUnloadNowFn = unsafe extern "C" fn() -> u32;
type DllInitFn = unsafe extern "C" fn() -> u32;
type DllExpungeFn = unsafe extern "C" fn();

struct LibNode {
    links: Links<LibNode>,
    path: String,
    library: Option<libloading::Library>,
    load_count: u32,
}

unsafe impl Node for LibNode {
    fn links(&self) -> &Links<Self> {
        &self.links
    }
}

/// Opaque handle to a loaded library, as returned by [`LibraryManager::load`].
#[derive(Clone, Copy)]
pub struct LibraryHandle(NonNull<LibNode>);

// A handle is just a tagged pointer; all access to the pointee is mediated
// by `LibraryManager`'s own mutex.
unsafe impl Send for LibraryHandle {}
unsafe impl Sync for LibraryHandle {}

pub struct LibraryManager<'a> {
    config: &'a RuntimeConfig,
    list: Mutex<List<LibNode>>,
}

impl<'a> LibraryManager<'a> {
    pub fn new(config: &'a RuntimeConfig) -> Self {
        LibraryManager {
            config,
            list: Mutex::new(List::new()),
        }
    }

    fn find(list: &List<LibNode>, path: &str) -> Option<NonNull<LibNode>> {
        list.iter().find(|n| {
            let node = unsafe { n.as_ref() };
            path_eq(&node.path, path)
        })
    }

    /// Loads `path`, deduplicating on an existing node with an
    /// equal canonical path (§4.D).
    pub fn load(&self, path: &str) -> Result<LibraryHandle, Error> {
        let list = self.list.lock().unwrap();

        if let Some(existing) = Self::find(&list, path) {
            unsafe { (*existing.as_ptr()).load_count += 1 };
            return Ok(LibraryHandle(existing));
        }

        let library = match unsafe { libloading::Library::new(path) } {
            Ok(lib) => lib,
            Err(source) => {
                return Err(Error::LibraryNotFound {
                    path: path.to_string(),
                    source: Some(source),
                });
            }
        };

        let node = Box::new(LibNode {
            links: Links::new(),
            path: path.to_string(),
            library: Some(library),
            load_count: 1,
        });
        let node = NonNull::from(Box::leak(node));

        if let Err(e) = self.run_init(node) {
            let node = unsafe { Box::from_raw(node.as_ptr()) };
            drop(node);
            return Err(e);
        }

        unsafe { list.add_tail(node) };
        log::debug!("loaded library {path}");
        Ok(LibraryHandle(node))
    }

    fn run_init(&self, node: NonNull<LibNode>) -> Result<(), Error> {
        let library = unsafe { node.as_ref() }.library.as_ref().unwrap();
        let symbol = self.config.init_symbol.as_bytes();
        match unsafe { library.get::<DllInitFn>(symbol) } {
            Ok(init) => {
                let hr = unsafe { init() };
                if hr & 0x8000_0000 != 0 {
                    Err(Error::LibraryNotFound {
                        path: unsafe { node.as_ref() }.path.clone(),
                        source: None,
                    })
                } else {
                    Ok(())
                }
            }
            // Absence of init is treated as success (§4.D, §6).
            Err(_) => Ok(()),
        }
    }

    /// Decrements the node's load count; at zero, runs teardown, unlinks,
    /// and drops the native handle (§4.D).
    pub fn unload(&self, handle: LibraryHandle) {
        let list = self.list.lock().unwrap();
        let node = handle.0;
        unsafe {
            let n = &mut *node.as_ptr();
            if n.load_count > 0 {
                n.load_count -= 1;
            }
            if n.load_count == 0 {
                self.run_teardown(node);
                list.remove(node);
                drop(Box::from_raw(node.as_ptr()));
                log::debug!("unloaded library");
            }
        }
    }

    fn run_teardown(&self, node: NonNull<LibNode>) {
        let library = unsafe { node.as_ref() }.library.as_ref().unwrap();
        let symbol = self.config.teardown_symbol.as_bytes();
        if let Ok(expunge) = unsafe { library.get::<DllExpungeFn>(symbol) } {
            unsafe { expunge() };
        }
    }

    /// Resolves a symbol in the given library.
    pub fn get_symbol<F: Copy>(&self, handle: LibraryHandle, name: &str) -> Result<F, Error> {
        let node = unsafe { handle.0.as_ref() };
        let library = node.library.as_ref().unwrap();
        unsafe {
            library
                .get::<F>(name.as_bytes())
                .map(|sym| *sym)
                .map_err(|_| Error::SymbolNotFound(name.to_string()))
        }
    }

    /// Calls the mandatory `DllGetClassObject` export (§6). Returns the raw
    /// `HResult` and, on success, the interface pointer.
    pub fn get_class_object(
        &self,
        handle: LibraryHandle,
        class_id: &Guid,
        interface_id: &Guid,
    ) -> Result<*mut c_void, Error> {
        let get_class_object: DllGetClassObjectFn =
            self.get_symbol(handle, "DllGetClassObject")?;
        let mut out: *mut c_void = std::ptr::null_mut();
        let hr = unsafe { get_class_object(class_id, interface_id, &mut out) };
        if hr & 0x8000_0000 != 0 {
            Err(Error::ClassNotRegistered(*class_id))
        } else {
            Ok(out)
        }
    }

    /// Calls the optional `DllCanUnloadNow` export; absence is conservative
    /// (`false`), per §4.D. `S_OK` (0) means "safe to unload"; `S_FALSE` (1)
    /// means "still busy" — both carry severity 0, so the check must compare
    /// the exact code, not just the severity bit.
    pub fn can_unload_now(&self, handle: LibraryHandle) -> bool {
        match self.get_symbol::<DllCanUnloadNowFn>(handle, "DllCanUnloadNow") {
            Ok(can_unload_now) => unsafe { can_unload_now() } == 0,
            Err(_) => false,
        }
    }

    /// Walks every cached library and unloads those reporting
    /// `can_unload_now() == true` (§4.U). Per §9, this always advances to
    /// the next node regardless of whether the current one was unloaded —
    /// the original's sweep loop fails to advance on a "not safe" result and
    /// spins forever; this port does not repeat that bug.
    pub fn free_unused_libraries(&self) {
        let handles: Vec<LibraryHandle> = {
            let list = self.list.lock().unwrap();
            list.iter().map(LibraryHandle).collect()
        };
        for handle in handles {
            if self.can_unload_now(handle) {
                self.unload(handle);
            }
        }
    }

    #[cfg(test)]
    fn load_count(&self, handle: LibraryHandle) -> u32 {
        unsafe { handle.0.as_ref() }.load_count
    }
}

#[cfg(unix)]
fn path_eq(a: &str, b: &str) -> bool {
    a == b
}

#[cfg(not(unix))]
fn path_eq(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;

    #[test]
    fn loading_a_missing_library_is_library_not_found() {
        let cfg = RuntimeConfig::default();
        let mgr = LibraryManager::new(&cfg);
        let err = mgr.load("/nonexistent/path/to/nothing.so").unwrap_err();
        assert!(matches!(err, Error::LibraryNotFound { .. }));
    }

    #[test]
    fn two_loads_of_the_same_path_dedup_the_load_count() {
        // Uses the process's own binary as a loadable "library" purely to
        // exercise cache-dedup bookkeeping without a real cdylib fixture.
        let exe = std::env::current_exe().unwrap();
        let path = exe.to_str().unwrap();
        let cfg = RuntimeConfig::default();
        let mgr = LibraryManager::new(&cfg);

        let h1 = mgr.load(path);
        if h1.is_err() {
            // Some platforms refuse to dlopen the running executable; skip.
            return;
        }
        let h1 = h1.unwrap();
        let h2 = mgr.load(path).unwrap();
        assert_eq!(mgr.load_count(h1), 2);
        mgr.unload(h2);
        assert_eq!(mgr.load_count(h1), 1);
        mgr.unload(h1);
    }
}
