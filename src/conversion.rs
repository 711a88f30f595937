//! Conversions between host [`Value`]s and engine values.
//!
//! Ownership rule for the whole module: a function that takes an engine
//! value by value consumes it. The caller must neither use nor free
//! that value afterwards. Functions that return an engine value hand
//! the caller an owned reference.
//!
//! Argument marshaling is two-pass. [`check_args`] validates the whole
//! list without touching the engine; only when every argument is known
//! to be convertible does [`convert_args`] allocate anything
//! engine-side. A rejected call therefore leaves no partially built
//! arguments behind.

use std::sync::Arc;

use libquickjs_sys as q;

use crate::capi;
use crate::context::ContextUnit;
use crate::error::{Error, Result};
use crate::exception;
use crate::object::Object;
use crate::value::Value;

pub(crate) const KIND_DETACHED: &str = "detached object handle";
pub(crate) const KIND_FOREIGN: &str = "object handle owned by a different context";
pub(crate) const KIND_NUL_IN_NAME: &str = "name with an embedded nul byte";

/// First pass: verify that every argument can cross into `unit`. Does
/// not take the unit lock and performs no engine work.
pub(crate) fn check_args(unit: &Arc<ContextUnit>, args: &[Value]) -> Result<()> {
    for (position, arg) in args.iter().enumerate() {
        check_arg(unit, arg, position)?;
    }
    Ok(())
}

/// Primitives always convert; an object handle only belongs across the
/// boundary of the unit that created it.
pub(crate) fn check_arg(unit: &Arc<ContextUnit>, arg: &Value, position: usize) -> Result<()> {
    if let Value::Object(handle) = arg {
        match handle.unit() {
            None => {
                return Err(Error::Argument {
                    position,
                    kind: KIND_DETACHED,
                })
            }
            Some(owner) if !Arc::ptr_eq(owner, unit) => {
                return Err(Error::Argument {
                    position,
                    kind: KIND_FOREIGN,
                })
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Second pass: build the engine-side argument vector. Every element of
/// the result is an owned reference the caller must release after the
/// call. If the engine runs out of memory partway through, the already
/// built prefix is released here and the engine's error is returned.
///
/// # Safety
/// The unit lock for `ctx` must be held, and [`check_args`] must have
/// accepted `args` against the same unit.
pub(crate) unsafe fn convert_args(
    ctx: *mut q::JSContext,
    args: &[Value],
) -> Result<Vec<q::JSValue>> {
    let mut converted = Vec::with_capacity(args.len());
    for arg in args {
        match unsafe { to_engine(ctx, arg) } {
            Ok(value) => converted.push(value),
            Err(err) => {
                for value in converted {
                    unsafe { capi::free_value(ctx, value) };
                }
                return Err(err);
            }
        }
    }
    Ok(converted)
}

/// Converts one validated host value into an owned engine reference.
///
/// # Safety
/// The unit lock for `ctx` must be held; an object value must already
/// have been checked to belong to that unit.
pub(crate) unsafe fn to_engine(ctx: *mut q::JSContext, value: &Value) -> Result<q::JSValue> {
    let converted = match value {
        Value::Null => capi::NULL,
        Value::Bool(v) => capi::mkval(capi::TAG_BOOL, i32::from(*v)),
        Value::Int(v) => capi::mkval(capi::TAG_INT, *v),
        Value::Float(v) => capi::mkfloat(*v),
        Value::String(v) => {
            let raw = unsafe { capi::new_string(ctx, v) };
            if capi::is_exception(raw) {
                return Err(unsafe { exception::take_exception(ctx) });
            }
            raw
        }
        // The call owns its own reference; the host handle keeps its.
        Value::Object(handle) => unsafe { capi::dup_value(handle.raw()) },
    };
    Ok(converted)
}

/// Converts an engine value into a host [`Value`]. Consumes `value` in
/// every branch, including the failure ones.
///
/// # Safety
/// The lock of `unit` must be held and `ctx` must be the context it
/// guards; `value` must be an owned reference into that context.
pub(crate) unsafe fn from_engine(
    unit: &Arc<ContextUnit>,
    ctx: *mut q::JSContext,
    value: q::JSValue,
) -> Result<Value> {
    let converted = match value.tag {
        capi::TAG_INT => Ok(Value::Int(capi::get_int(value))),
        capi::TAG_BOOL => Ok(Value::Bool(capi::get_bool(value))),
        capi::TAG_NULL | capi::TAG_UNDEFINED => Ok(Value::Null),
        capi::TAG_FLOAT64 => Ok(Value::Float(capi::get_float(value))),
        capi::TAG_STRING => match unsafe { capi::copy_string(ctx, value) } {
            Some(text) => Ok(Value::String(text)),
            None => Err(unsafe { exception::take_exception(ctx) }),
        },
        // Objects and functions both arrive with the object tag. The
        // handle takes its own reference on top of the one consumed
        // below, plus a strong reference to the unit so the engine
        // outlives the handle.
        capi::TAG_OBJECT => Ok(Value::Object(Object::from_engine(unit, unsafe {
            capi::dup_value(value)
        }))),
        capi::TAG_EXCEPTION => Err(unsafe { exception::take_exception(ctx) }),
        tag => Err(Error::UnknownTag(tag)),
    };
    unsafe { capi::free_value(ctx, value) };
    converted
}
