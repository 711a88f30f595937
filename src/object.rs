use std::fmt;
use std::os::raw::c_char;
use std::sync::Arc;

use libquickjs_sys as q;
use tracing::trace;

use crate::capi;
use crate::context::{ContextUnit, EngineCell};
use crate::conversion;
use crate::error::Result;
use crate::value::Value;

/// Host handle to one engine object or function.
///
/// The handle owns one engine-level reference to the wrapped value and
/// one strong reference to the context unit it came from, so the unit's
/// teardown waits for the last handle. Dropping the handle releases the
/// engine reference under the unit lock.
///
/// A handle can also exist with no context attached ([`Object::detached`]).
/// Such a handle is inert: calling it never touches the engine and
/// yields [`Value::Null`].
pub struct Object {
    unit: Option<Arc<ContextUnit>>,
    value: q::JSValue,
}

// The wrapped raw value is only touched while the owning unit's mutex
// is held, which also serializes the non-atomic engine refcount.
unsafe impl Send for Object {}
unsafe impl Sync for Object {}

impl Object {
    /// Wraps `value`, taking over the engine reference the caller owns.
    pub(crate) fn from_engine(unit: &Arc<ContextUnit>, value: q::JSValue) -> Self {
        Object {
            unit: Some(Arc::clone(unit)),
            value,
        }
    }

    /// A handle bound to no context.
    pub fn detached() -> Self {
        Object {
            unit: None,
            value: capi::UNDEFINED,
        }
    }

    pub fn is_detached(&self) -> bool {
        self.unit.is_none()
    }

    pub(crate) fn unit(&self) -> Option<&Arc<ContextUnit>> {
        self.unit.as_ref()
    }

    pub(crate) fn raw(&self) -> q::JSValue {
        self.value
    }

    /// Invokes the wrapped value as a function with `this` set to the
    /// engine's null sentinel.
    ///
    /// Arguments are marshaled in two passes: the list is validated
    /// before anything is allocated engine-side, so a rejected call
    /// reports [`Error::Argument`](crate::Error::Argument) with the
    /// offending position and leaves the engine untouched. Calling a
    /// wrapped non-function yields the engine's own `TypeError` as
    /// [`Error::Script`](crate::Error::Script). The passed-in handles
    /// stay valid; the call duplicates and releases its own references.
    pub fn call(&self, args: &[Value]) -> Result<Value> {
        let Some(unit) = &self.unit else {
            return Ok(Value::Null);
        };
        conversion::check_args(unit, args)?;
        trace!(argc = args.len(), "calling engine function");
        let cell = unit.lock();
        unsafe {
            let mut engine_args = conversion::convert_args(cell.context, args)?;
            let result = invoke(unit, &cell, self.value, capi::NULL, &mut engine_args);
            for arg in engine_args {
                capi::free_value(cell.context, arg);
            }
            result
        }
    }

    /// Renders the wrapped value with the engine's own `JSON.stringify`,
    /// resolved from the owning context's globals and invoked through
    /// the same machinery as [`call`](Object::call).
    ///
    /// Yields [`Value::String`] normally and [`Value::Null`] where JSON
    /// has no representation (the engine returns `undefined` for a
    /// function, for example).
    pub fn json(&self) -> Result<Value> {
        let Some(unit) = &self.unit else {
            return Ok(Value::Null);
        };
        let cell = unit.lock();
        unsafe {
            let global = q::JS_GetGlobalObject(cell.context);
            let json =
                q::JS_GetPropertyStr(cell.context, global, b"JSON\0".as_ptr() as *const c_char);
            let stringify =
                q::JS_GetPropertyStr(cell.context, json, b"stringify\0".as_ptr() as *const c_char);
            let result = invoke(unit, &cell, stringify, json, &mut [self.value]);
            capi::free_value(cell.context, stringify);
            capi::free_value(cell.context, json);
            capi::free_value(cell.context, global);
            result
        }
    }
}

/// Shared tail of every function invocation: the blocking engine call
/// followed by result conversion. Does not consume `func`, `this` or
/// the arguments.
///
/// # Safety
/// `cell` must be the locked cell of `unit`, and all passed values must
/// be live references into it.
unsafe fn invoke(
    unit: &Arc<ContextUnit>,
    cell: &EngineCell,
    func: q::JSValue,
    this: q::JSValue,
    args: &mut [q::JSValue],
) -> Result<Value> {
    let raw = unsafe {
        q::JS_Call(
            cell.context,
            func,
            this,
            args.len() as i32,
            args.as_mut_ptr(),
        )
    };
    unsafe { conversion::from_engine(unit, cell.context, raw) }
}

impl Clone for Object {
    fn clone(&self) -> Self {
        if let Some(unit) = &self.unit {
            let _cell = unit.lock();
            unsafe {
                // SAFETY: lock held; the handle owns a live reference.
                capi::dup_value(self.value);
            }
        }
        Object {
            unit: self.unit.clone(),
            value: self.value,
        }
    }
}

impl Drop for Object {
    fn drop(&mut self) {
        if let Some(unit) = self.unit.take() {
            let cell = unit.lock();
            unsafe {
                // SAFETY: lock held; releases the one reference this
                // handle has owned since construction.
                capi::free_value(cell.context, self.value);
            }
        }
    }
}

/// Engine identity: two handles are equal when they wrap the same heap
/// value of the same context unit. Detached handles are all equal.
impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        match (&self.unit, &other.unit) {
            (Some(a), Some(b)) => {
                Arc::ptr_eq(a, b) && unsafe { self.value.u.ptr == other.value.u.ptr }
            }
            (None, None) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.unit {
            Some(_) => write!(f, "Object({:p})", unsafe { self.value.u.ptr }),
            None => f.write_str("Object(detached)"),
        }
    }
}
