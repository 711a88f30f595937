//! Thin layer over the raw QuickJS C API.
//!
//! The generated bindings cover every exported function, but the
//! static-inline half of `quickjs.h` (value construction, tag checks,
//! reference counting) has to be restated here. Keeping all of it in one
//! module also keeps the ownership rules auditable: a `JSValue` with a
//! negative tag is a heap reference whose count must be balanced by
//! exactly one [`free_value`] per [`dup_value`] or engine-returned
//! reference.

use std::ffi::CStr;
use std::os::raw::c_char;

use libquickjs_sys as q;

// C: JS_TAG_* in quickjs.h, widened to 64 bits as stored in JSValue.
pub(crate) const TAG_STRING: i64 = -7;
pub(crate) const TAG_OBJECT: i64 = -1;
pub(crate) const TAG_INT: i64 = 0;
pub(crate) const TAG_BOOL: i64 = 1;
pub(crate) const TAG_NULL: i64 = 2;
pub(crate) const TAG_UNDEFINED: i64 = 3;
pub(crate) const TAG_EXCEPTION: i64 = 6;
pub(crate) const TAG_FLOAT64: i64 = 7;

// C: JS_MKVAL in quickjs.h.
pub(crate) const fn mkval(tag: i64, val: i32) -> q::JSValue {
    q::JSValue {
        u: q::JSValueUnion { int32: val },
        tag,
    }
}

// C: JS_NewFloat64 in quickjs.h, without the NaN-boxing arm.
pub(crate) const fn mkfloat(val: f64) -> q::JSValue {
    q::JSValue {
        u: q::JSValueUnion { float64: val },
        tag: TAG_FLOAT64,
    }
}

pub(crate) const NULL: q::JSValue = mkval(TAG_NULL, 0);
pub(crate) const UNDEFINED: q::JSValue = mkval(TAG_UNDEFINED, 0);

// C: JS_VALUE_HAS_REF_COUNT in quickjs.h. All heap values carry
// negative tags.
pub(crate) fn has_refcount(value: q::JSValue) -> bool {
    value.tag < 0
}

pub(crate) fn is_exception(value: q::JSValue) -> bool {
    value.tag == TAG_EXCEPTION
}

pub(crate) fn get_int(value: q::JSValue) -> i32 {
    unsafe {
        // SAFETY: only called on TAG_INT / TAG_BOOL values, which store
        // their payload in the int32 arm.
        value.u.int32
    }
}

pub(crate) fn get_bool(value: q::JSValue) -> bool {
    get_int(value) != 0
}

pub(crate) fn get_float(value: q::JSValue) -> f64 {
    unsafe {
        // SAFETY: only called on TAG_FLOAT64 values.
        value.u.float64
    }
}

/// C: JS_DupValue in quickjs.h. Returns the value with its reference
/// count raised by one; the caller owns the new reference.
///
/// # Safety
/// `value` must be live, and the owning context's lock must be held.
pub(crate) unsafe fn dup_value(value: q::JSValue) -> q::JSValue {
    if has_refcount(value) {
        let header = unsafe { value.u.ptr } as *mut q::JSRefCountHeader;
        unsafe {
            // SAFETY: heap values start with a JSRefCountHeader.
            (*header).ref_count += 1;
        }
    }
    value
}

/// C: JS_FreeValue in quickjs.h. Releases one reference.
///
/// # Safety
/// `value` must be an owned reference into `ctx`, and the owning
/// context's lock must be held. `value` must not be used afterwards.
pub(crate) unsafe fn free_value(ctx: *mut q::JSContext, value: q::JSValue) {
    if has_refcount(value) {
        let header = unsafe { value.u.ptr } as *mut q::JSRefCountHeader;
        unsafe {
            // SAFETY: heap values start with a JSRefCountHeader.
            (*header).ref_count -= 1;
            if (*header).ref_count <= 0 {
                q::__JS_FreeValue(ctx, value);
            }
        }
    }
}

/// Allocates an engine string from host text. The result is an owned
/// reference, or the exception marker if the engine is out of memory.
///
/// # Safety
/// The owning context's lock must be held.
pub(crate) unsafe fn new_string(ctx: *mut q::JSContext, text: &str) -> q::JSValue {
    unsafe { q::JS_NewStringLen(ctx, text.as_ptr() as *const c_char, text.len() as _) }
}

/// Copies the engine's string rendering of `value` into a host string.
/// Does not consume `value`; returns `None` when the engine cannot
/// produce a C string (a pending exception is left to the caller).
///
/// # Safety
/// The owning context's lock must be held.
pub(crate) unsafe fn copy_string(ctx: *mut q::JSContext, value: q::JSValue) -> Option<String> {
    let ptr = unsafe { q::JS_ToCStringLen2(ctx, std::ptr::null_mut(), value, 0) };
    if ptr.is_null() {
        return None;
    }
    let text = unsafe {
        // SAFETY: the engine hands back a NUL-terminated UTF-8 buffer
        // that stays valid until JS_FreeCString.
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    };
    unsafe { q::JS_FreeCString(ctx, ptr) };
    Some(text)
}
