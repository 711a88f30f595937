//! Translation of the engine's pending-exception slot into host errors.
//!
//! The engine reports failure out of band: a call returns the exception
//! marker and parks the thrown value in a per-context slot. Draining
//! that slot is done here, exactly once per failing call, so the marker
//! never outlives the operation that produced it and the context stays
//! usable afterwards.

use libquickjs_sys as q;

use crate::capi;
use crate::error::Error;

const UNPRINTABLE: &str = "exception could not be converted to a string";

/// Drains the context's pending exception and renders it as
/// [`Error::Script`]. When this returns, the slot is clear.
///
/// # Safety
/// The owning context's lock must be held, and a pending exception must
/// exist (an engine call just returned the exception marker or a null
/// C string).
pub(crate) unsafe fn take_exception(ctx: *mut q::JSContext) -> Error {
    let exception = unsafe { q::JS_GetException(ctx) };
    let text = unsafe { q::JS_ToString(ctx, exception) };
    let message = if capi::is_exception(text) {
        // Stringification itself threw (out of memory, hostile
        // toString). Clear the nested exception as well so the slot is
        // left empty.
        let nested = unsafe { q::JS_GetException(ctx) };
        unsafe { capi::free_value(ctx, nested) };
        None
    } else {
        unsafe { capi::copy_string(ctx, text) }
    };
    unsafe {
        capi::free_value(ctx, text);
        capi::free_value(ctx, exception);
    }
    Error::Script(message.unwrap_or_else(|| UNPRINTABLE.to_owned()))
}
