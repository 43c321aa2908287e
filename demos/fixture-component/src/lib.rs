//! Test fixture `cdylib`, grounded on the original's `ex1` tutorial
//! component (`IClassFactory_impl.c` / `IDisplayText_impl.c`): one class id
//! exposing a factory for an object implementing a text-buffer interface in
//! addition to the required unknown interface, but nothing else — used by
//! the crate's end-to-end activation tests to exercise a real FFI boundary.
//!
//! Unlike the original, `Release` here always returns the remaining
//! reference count (§9 bug fix a) instead of falling off the end of the
//! function with no return value.

use gcom_rt::error::HResult;
use gcom_rt::guid::Guid;
use gcom_rt::interface::{ClassFactoryVtbl, UnknownVtbl};
use std::ffi::c_void;
use std::sync::atomic::{AtomicU32, Ordering::SeqCst};
use std::sync::Mutex;

/// `{F19700E0-0001-0001-0001-000000000001}`
pub const CLSID_FIXTURE: Guid = Guid::new(0xF197_00E0, 0x0001, 0x0001, [0, 0, 0, 0, 0, 0, 0, 1]);

/// `{F19700E0-0002-0001-0001-000000000001}`
pub const IID_DISPLAY_TEXT: Guid = Guid::new(0xF197_00E0, 0x0002, 0x0001, [0, 0, 0, 0, 0, 0, 0, 1]);

static OBJECT_COUNT: AtomicU32 = AtomicU32::new(0);
static FACTORY_REFS: AtomicU32 = AtomicU32::new(0);
static LOCK_COUNT: AtomicU32 = AtomicU32::new(0);

#[repr(C)]
struct DisplayTextVtbl {
    unknown: UnknownVtbl,
    set_text: unsafe extern "C" fn(*mut c_void, *const u8, u32) -> u32,
    get_text: unsafe extern "C" fn(*mut c_void, *mut u8, u32) -> u32,
    display: unsafe extern "C" fn(*mut c_void) -> u32,
}

#[repr(C)]
struct DisplayTextObject {
    vtbl: *const DisplayTextVtbl,
    reference_count: AtomicU32,
    buffer: Mutex<String>,
}

static DISPLAY_TEXT_VTBL: DisplayTextVtbl = DisplayTextVtbl {
    unknown: UnknownVtbl {
        query_interface: object_query_interface,
        add_ref: object_add_ref,
        release: object_release,
    },
    set_text: object_set_text,
    get_text: object_get_text,
    display: object_display,
};

unsafe extern "C" fn object_query_interface(
    this: *mut c_void,
    iid: *const Guid,
    out: *mut *mut c_void,
) -> u32 {
    let iid = unsafe { &*iid };
    if *iid == Guid::IID_UNKNOWN || *iid == IID_DISPLAY_TEXT {
        unsafe { *out = this };
        object_add_ref(this);
        HResult::OK.0
    } else {
        unsafe { *out = std::ptr::null_mut() };
        HResult::NO_INTERFACE.0
    }
}

unsafe extern "C" fn object_add_ref(this: *mut c_void) -> u32 {
    let obj = unsafe { &*(this as *const DisplayTextObject) };
    obj.reference_count.fetch_add(1, SeqCst) + 1
}

unsafe extern "C" fn object_release(this: *mut c_void) -> u32 {
    let obj = unsafe { &*(this as *const DisplayTextObject) };
    let remaining = obj.reference_count.fetch_sub(1, SeqCst) - 1;
    if remaining == 0 {
        drop(unsafe { Box::from_raw(this as *mut DisplayTextObject) });
        OBJECT_COUNT.fetch_sub(1, SeqCst);
    }
    remaining
}

unsafe extern "C" fn object_set_text(this: *mut c_void, buf: *const u8, size: u32) -> u32 {
    let obj = unsafe { &*(this as *const DisplayTextObject) };
    let bytes = unsafe { std::slice::from_raw_parts(buf, size as usize) };
    let text = String::from_utf8_lossy(bytes).into_owned();
    *obj.buffer.lock().unwrap() = text;
    HResult::OK.0
}

unsafe extern "C" fn object_get_text(this: *mut c_void, buf: *mut u8, size: u32) -> u32 {
    let obj = unsafe { &*(this as *const DisplayTextObject) };
    let text = obj.buffer.lock().unwrap();
    let bytes = text.as_bytes();
    let to_copy = bytes.len().min(size as usize);
    unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), buf, to_copy) };
    if to_copy < bytes.len() {
        HResult::FALSE.0
    } else {
        HResult::OK.0
    }
}

unsafe extern "C" fn object_display(this: *mut c_void) -> u32 {
    let obj = unsafe { &*(this as *const DisplayTextObject) };
    log::info!("fixture text: {}", obj.buffer.lock().unwrap());
    HResult::OK.0
}

#[repr(C)]
struct ClassFactoryObject {
    vtbl: *const ClassFactoryVtbl,
}

static FACTORY_VTBL: ClassFactoryVtbl = ClassFactoryVtbl {
    unknown: UnknownVtbl {
        query_interface: factory_query_interface,
        add_ref: factory_add_ref,
        release: factory_release,
    },
    create_instance: factory_create_instance,
    lock_server: factory_lock_server,
};

static FACTORY: ClassFactoryObject = ClassFactoryObject { vtbl: &FACTORY_VTBL };

unsafe extern "C" fn factory_query_interface(
    this: *mut c_void,
    iid: *const Guid,
    out: *mut *mut c_void,
) -> u32 {
    let iid = unsafe { &*iid };
    if *iid == Guid::IID_UNKNOWN || *iid == Guid::IID_CLASS_FACTORY {
        unsafe { *out = this };
        factory_add_ref(this);
        HResult::OK.0
    } else {
        unsafe { *out = std::ptr::null_mut() };
        HResult::NO_INTERFACE.0
    }
}

unsafe extern "C" fn factory_add_ref(_this: *mut c_void) -> u32 {
    FACTORY_REFS.fetch_add(1, SeqCst) + 1
}

/// Always returns the remaining reference count (§9 bug fix a) — the
/// original's `Release` has no return statement at all.
unsafe extern "C" fn factory_release(_this: *mut c_void) -> u32 {
    let current = FACTORY_REFS.load(SeqCst);
    if current != 0 {
        FACTORY_REFS.fetch_sub(1, SeqCst) - 1
    } else {
        0
    }
}

unsafe extern "C" fn factory_create_instance(
    _this: *mut c_void,
    outer: *mut c_void,
    iid: *const Guid,
    out: *mut *mut c_void,
) -> u32 {
    unsafe { *out = std::ptr::null_mut() };

    if !outer.is_null() {
        return HResult::NO_AGGREGATION.0;
    }

    let object = Box::new(DisplayTextObject {
        vtbl: &DISPLAY_TEXT_VTBL,
        reference_count: AtomicU32::new(0),
        buffer: Mutex::new(String::new()),
    });
    let object_ptr = Box::into_raw(object) as *mut c_void;

    let hr = unsafe { object_query_interface(object_ptr, iid, out) };
    if hr & 0x8000_0000 != 0 {
        drop(unsafe { Box::from_raw(object_ptr as *mut DisplayTextObject) });
    } else {
        OBJECT_COUNT.fetch_add(1, SeqCst);
    }
    hr
}

unsafe extern "C" fn factory_lock_server(_this: *mut c_void, lock: i32) -> u32 {
    if lock != 0 {
        LOCK_COUNT.fetch_add(1, SeqCst);
    } else if LOCK_COUNT.load(SeqCst) != 0 {
        LOCK_COUNT.fetch_sub(1, SeqCst);
    }
    HResult::OK.0
}

/// Mandatory library export (§6): the only class id this fixture answers is
/// [`CLSID_FIXTURE`], and the only interfaces its factory answers are
/// `IUnknown` and `IClassFactory`.
#[no_mangle]
pub unsafe extern "C" fn DllGetClassObject(
    class_id: *const Guid,
    interface_id: *const Guid,
    out: *mut *mut c_void,
) -> u32 {
    let class_id = unsafe { &*class_id };
    if *class_id != CLSID_FIXTURE {
        unsafe { *out = std::ptr::null_mut() };
        return HResult::CLASS_NOT_REGISTERED.0;
    }
    unsafe { factory_query_interface(&FACTORY as *const ClassFactoryObject as *mut c_void, interface_id, out) }
}

/// Optional library export (§4.D): reports `S_OK` only once every object,
/// factory reference, and server lock has dropped to zero.
#[no_mangle]
pub extern "C" fn DllCanUnloadNow() -> u32 {
    if OBJECT_COUNT.load(SeqCst) == 0 && FACTORY_REFS.load(SeqCst) == 0 && LOCK_COUNT.load(SeqCst) == 0 {
        HResult::OK.0
    } else {
        HResult::FALSE.0
    }
}

/// Default-named init export (§4.D); this fixture has no one-time setup
/// beyond logging, but exercises the init/teardown symbol-invocation path.
#[no_mangle]
pub extern "C" fn __init_com_() -> u32 {
    log::debug!("fixture-component initialized");
    HResult::OK.0
}

/// Default-named teardown export (§4.D).
#[no_mangle]
pub extern "C" fn __expunge_com_() {
    log::debug!("fixture-component torn down");
}
