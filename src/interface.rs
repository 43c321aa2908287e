//! The `IUnknown` / class-factory ABI contract (§4.I, §6).
//!
//! Within this crate's own Rust code, objects are addressed through the
//! [`Unknown`] and [`ClassFactory`] traits using ordinary dynamic dispatch.
//! At the boundary crossed by a hosted library's `DllGetClassObject` export
//! — a separately-compiled `cdylib` this crate cannot share a Rust vtable
//! layout with — the contract is expressed as a `#[repr(C)]` vtable, the
//! same way a COM-facing crate in this ecosystem binds foreign ABI shapes
//! (see the teacher's `windows/ffi.rs`).

use crate::guid::Guid;
use std::ffi::c_void;
use std::ptr::NonNull;

/// Every interface's first three vtable slots, in order (§6): query-interface,
/// add-ref, release.
#[repr(C)]
pub struct UnknownVtbl {
    pub query_interface:
        unsafe extern "C" fn(this: *mut c_void, iid: *const Guid, out: *mut *mut c_void) -> u32,
    pub add_ref: unsafe extern "C" fn(this: *mut c_void) -> u32,
    pub release: unsafe extern "C" fn(this: *mut c_void) -> u32,
}

/// Class factories additionally expose `create_instance` and `lock_server`
/// immediately after the `IUnknown` triple (§4.I).
#[repr(C)]
pub struct ClassFactoryVtbl {
    pub unknown: UnknownVtbl,
    pub create_instance: unsafe extern "C" fn(
        this: *mut c_void,
        outer: *mut c_void,
        iid: *const Guid,
        out: *mut *mut c_void,
    ) -> u32,
    pub lock_server: unsafe extern "C" fn(this: *mut c_void, lock: i32) -> u32,
}

/// A raw `#[repr(C)]` COM-style object: a pointer to an instance together
/// with a pointer to its vtable, exactly as a hosted library would hand one
/// back from `DllGetClassObject`.
#[repr(C)]
pub struct RawObject<V> {
    pub vtbl: *const V,
}

/// Implemented by any `#[repr(C)]` vtable whose first field is the
/// `IUnknown` triple (§6: "every interface is a virtual-table whose first
/// three slots are query-interface, add-ref, release"). Lets [`ComPtr`]
/// call `add_ref`/`release` generically and lets a class-factory pointer be
/// reinterpreted as a plain unknown pointer (and back) without re-querying.
///
/// # Safety
/// `unknown` must return a reference to the same memory as the first field
/// of `Self`, so that a `*const Self` and a `*const UnknownVtbl` obtained
/// from it are interchangeable as the first argument to each other's
/// functions.
pub unsafe trait HasUnknown {
    fn unknown(&self) -> &UnknownVtbl;
}

unsafe impl HasUnknown for UnknownVtbl {
    fn unknown(&self) -> &UnknownVtbl {
        self
    }
}

unsafe impl HasUnknown for ClassFactoryVtbl {
    fn unknown(&self) -> &UnknownVtbl {
        &self.unknown
    }
}

/// An owning handle to a raw interface pointer obtained across the FFI
/// boundary: `Clone` calls `add_ref`, `Drop` calls `release`, matching
/// `IUnknown`'s reference-counting contract (§4.I).
pub struct ComPtr<V: HasUnknown> {
    ptr: NonNull<RawObject<V>>,
}

impl<V: HasUnknown> ComPtr<V> {
    /// # Safety
    /// `ptr` must point to a valid `RawObject<V>`, and the caller must
    /// already own one reference (this does not call `add_ref` on
    /// construction, mirroring how `DllGetClassObject` hands back an
    /// already-referenced pointer).
    pub unsafe fn from_raw(ptr: NonNull<RawObject<V>>) -> Self {
        ComPtr { ptr }
    }

    pub fn as_ptr(&self) -> NonNull<RawObject<V>> {
        self.ptr
    }

    pub fn vtbl(&self) -> &V {
        unsafe { &*self.ptr.as_ref().vtbl }
    }

    /// Reinterprets this pointer as a different (ABI-compatible) vtable
    /// shape, without touching the reference count — e.g. turning a
    /// class-factory pointer into a plain unknown pointer to call
    /// `query_interface` on it.
    pub fn cast<W: HasUnknown>(self) -> ComPtr<W> {
        let raw = self.ptr.cast::<RawObject<W>>();
        std::mem::forget(self);
        ComPtr { ptr: raw }
    }
}

impl<V: HasUnknown> Clone for ComPtr<V> {
    fn clone(&self) -> Self {
        let add_ref = self.vtbl().unknown().add_ref;
        unsafe { add_ref(self.ptr.as_ptr() as *mut c_void) };
        ComPtr { ptr: self.ptr }
    }
}

impl<V: HasUnknown> Drop for ComPtr<V> {
    fn drop(&mut self) {
        let release = self.vtbl().unknown().release;
        unsafe { release(self.ptr.as_ptr() as *mut c_void) };
    }
}

/// Safe-Rust side of the `IUnknown` contract (§4.I), used by objects that
/// live and are consumed entirely within this crate's own process (as
/// opposed to objects reached through a raw `ComPtr` across the FFI
/// boundary).
pub trait Unknown {
    /// On success, stores an owned reference in `out` and returns `true`.
    /// Reflexive: every object answers its own interface and
    /// [`Guid::IID_UNKNOWN`].
    fn query_interface(&self, iid: &Guid) -> Option<Box<dyn Unknown>>;
    fn add_ref(&self) -> u32;
    fn release(&self) -> u32;
}

/// Extends [`Unknown`] with the class-factory operations (§4.I).
pub trait ClassFactory: Unknown {
    /// Must reject `outer.is_some()` with [`crate::error::Error::NoAggregation`].
    fn create_instance(
        &self,
        outer: Option<&dyn Unknown>,
        iid: &Guid,
    ) -> Result<Box<dyn Unknown>, crate::error::Error>;

    /// Increments or decrements the server lock count; saturates at zero on
    /// decrement.
    fn lock_server(&self, lock: bool);
}

/// The per-library aggregate counters that feed `can-unload-now` (§4.I):
/// a library is quiescent iff all three are zero.
#[derive(Debug, Default)]
pub struct FactoryCounters {
    pub reference_count: std::sync::atomic::AtomicU32,
    pub object_count: std::sync::atomic::AtomicU32,
    pub lock_count: std::sync::atomic::AtomicU32,
}

impl FactoryCounters {
    pub fn is_quiescent(&self) -> bool {
        use std::sync::atomic::Ordering::SeqCst;
        self.reference_count.load(SeqCst) == 0
            && self.object_count.load(SeqCst) == 0
            && self.lock_count.load(SeqCst) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering::SeqCst;

    #[test]
    fn quiescent_iff_all_three_counters_are_zero() {
        let c = FactoryCounters::default();
        assert!(c.is_quiescent());
        c.object_count.store(1, SeqCst);
        assert!(!c.is_quiescent());
        c.object_count.store(0, SeqCst);
        c.lock_count.store(1, SeqCst);
        assert!(!c.is_quiescent());
    }
}
