use std::ffi::CString;
use std::mem::MaybeUninit;
use std::os::raw::c_char;
use std::sync::{Arc, Mutex, MutexGuard};

use bitflags::bitflags;
use libquickjs_sys as q;
use tracing::{debug, trace};

use crate::capi;
use crate::conversion;
use crate::error::{Error, Result};
use crate::exception;
use crate::value::Value;

bitflags! {
    /// Optional evaluation behavior forwarded to the engine. Evaluation
    /// always runs as global code; these bits only adjust how.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EvalFlags: u32 {
        /// Force strict mode regardless of source directives.
        const STRICT = q::JS_EVAL_FLAG_STRICT as u32;
        /// Strip debug information while compiling.
        const STRIP = q::JS_EVAL_FLAG_STRIP as u32;
    }
}

/// Snapshot of the engine's own memory accounting.
///
/// Sizes are bytes, counts are numbers of live allocations; the engine
/// reports them as signed 64-bit values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryUsage {
    pub malloc_size: i64,
    pub malloc_limit: i64,
    pub memory_used_size: i64,
    pub malloc_count: i64,
    pub memory_used_count: i64,
    pub obj_count: i64,
    pub str_count: i64,
}

/// One engine runtime with the single engine context created on it.
/// Everything derived from a context unit (evaluation results, object
/// handles) keeps the unit alive through an [`Arc`] of this type, so
/// teardown cannot run before the last reference is gone.
pub(crate) struct ContextUnit {
    cell: Mutex<EngineCell>,
}

pub(crate) struct EngineCell {
    pub(crate) runtime: *mut q::JSRuntime,
    pub(crate) context: *mut q::JSContext,
}

// The raw pointers are only dereferenced while the cell's mutex guard
// is held, and the engine does not bind a runtime to the thread that
// created it.
unsafe impl Send for EngineCell {}

impl ContextUnit {
    /// Exclusive access to the engine for the duration of the returned
    /// guard. Units never share a lock, so holding one unit's guard
    /// through a long script cannot stall threads working on other
    /// units.
    pub(crate) fn lock(&self) -> MutexGuard<'_, EngineCell> {
        self.cell.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for ContextUnit {
    fn drop(&mut self) {
        let cell = self
            .cell
            .get_mut()
            .unwrap_or_else(|e| e.into_inner());
        unsafe {
            // SAFETY: last reference to the unit; the context is freed
            // before the runtime that backs it.
            q::JS_FreeContext(cell.context);
            q::JS_FreeRuntime(cell.runtime);
        }
        debug!("engine context destroyed");
    }
}

/// One isolated script engine instance.
///
/// Each `Context` owns its own runtime, so distinct contexts share no
/// engine state and may run scripts truly in parallel on different
/// threads. A single context serializes its callers on an internal
/// lock; there is no cancellation, and a script that never returns
/// blocks its caller for as long as it runs.
///
/// Cloning a `Context` yields another handle to the same instance.
#[derive(Clone)]
pub struct Context {
    unit: Arc<ContextUnit>,
}

impl Context {
    /// Creates a context with the engine's default configuration.
    ///
    /// # Panics
    /// Panics if the engine cannot allocate a runtime, which is fatal
    /// rather than recoverable in this design.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    /// Compiles and executes `source` as global script code, returning
    /// the completion value. An engine-raised error arrives as
    /// [`Error::Script`] and leaves the context usable.
    pub fn eval(&self, source: &str) -> Result<Value> {
        self.eval_with_flags(source, EvalFlags::default())
    }

    pub fn eval_with_flags(&self, source: &str, flags: EvalFlags) -> Result<Value> {
        trace!(len = source.len(), "evaluating script");
        // The engine requires a NUL byte just past the end of the
        // buffer; interior NULs are left for its lexer to reject.
        let mut buf = Vec::with_capacity(source.len() + 1);
        buf.extend_from_slice(source.as_bytes());
        buf.push(0);
        let eval_flags = q::JS_EVAL_TYPE_GLOBAL as i32 | flags.bits() as i32;
        let cell = self.unit.lock();
        let raw = unsafe {
            q::JS_Eval(
                cell.context,
                buf.as_ptr() as *const c_char,
                source.len() as _,
                b"<input>\0".as_ptr() as *const c_char,
                eval_flags,
            )
        };
        unsafe { conversion::from_engine(&self.unit, cell.context, raw) }
    }

    /// Reads the named property of the global object. An absent global
    /// is the engine's `undefined`, which arrives as [`Value::Null`].
    pub fn get(&self, name: &str) -> Result<Value> {
        let name = property_name(name)?;
        let cell = self.unit.lock();
        unsafe {
            let global = q::JS_GetGlobalObject(cell.context);
            let raw = q::JS_GetPropertyStr(cell.context, global, name.as_ptr());
            capi::free_value(cell.context, global);
            conversion::from_engine(&self.unit, cell.context, raw)
        }
    }

    /// Writes a marshaled value to the named global. The value is
    /// validated before any engine-side allocation, with the same rules
    /// as call arguments.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        conversion::check_arg(&self.unit, &value, 0)?;
        let name = property_name(name)?;
        let cell = self.unit.lock();
        unsafe {
            let raw = conversion::to_engine(cell.context, &value)?;
            let global = q::JS_GetGlobalObject(cell.context);
            // JS_SetPropertyStr consumes the value reference.
            let ret = q::JS_SetPropertyStr(cell.context, global, name.as_ptr(), raw);
            capi::free_value(cell.context, global);
            if ret < 0 {
                return Err(exception::take_exception(cell.context));
            }
        }
        Ok(())
    }

    /// Configures the runtime's allocation ceiling. Engine allocations
    /// past the ceiling fail, surfacing as an out-of-memory
    /// [`Error::Script`] on whichever operation trips it.
    pub fn set_memory_limit(&self, bytes: usize) {
        debug!(bytes, "setting engine memory limit");
        let cell = self.unit.lock();
        unsafe { q::JS_SetMemoryLimit(cell.runtime, bytes as _) };
    }

    /// The engine's current memory accounting, from its own counters.
    pub fn memory_usage(&self) -> MemoryUsage {
        let cell = self.unit.lock();
        let mut raw = MaybeUninit::<q::JSMemoryUsage>::zeroed();
        let raw = unsafe {
            q::JS_ComputeMemoryUsage(cell.runtime, raw.as_mut_ptr());
            raw.assume_init()
        };
        MemoryUsage {
            malloc_size: raw.malloc_size,
            malloc_limit: raw.malloc_limit,
            memory_used_size: raw.memory_used_size,
            malloc_count: raw.malloc_count,
            memory_used_count: raw.memory_used_count,
            obj_count: raw.obj_count,
            str_count: raw.str_count,
        }
    }

    /// Forces a garbage collection pass in the engine.
    pub fn run_gc(&self) {
        let cell = self.unit.lock();
        unsafe { q::JS_RunGC(cell.runtime) };
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// Property names cross the boundary as C strings, so an embedded NUL
/// cannot be represented and is rejected up front.
fn property_name(name: &str) -> Result<CString> {
    CString::new(name).map_err(|_| Error::Argument {
        position: 0,
        kind: conversion::KIND_NUL_IN_NAME,
    })
}

/// Configuration applied to the runtime at construction time.
#[derive(Debug, Clone, Default)]
pub struct ContextBuilder {
    memory_limit: Option<usize>,
    gc_threshold: Option<usize>,
    max_stack_size: Option<usize>,
}

impl ContextBuilder {
    /// Allocation ceiling in bytes, as [`Context::set_memory_limit`]
    /// but in force from the first evaluation.
    pub fn memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    /// Heap size at which the engine triggers its own collection.
    pub fn gc_threshold(mut self, bytes: usize) -> Self {
        self.gc_threshold = Some(bytes);
        self
    }

    /// Engine-enforced bound on script stack depth, in bytes.
    pub fn max_stack_size(mut self, bytes: usize) -> Self {
        self.max_stack_size = Some(bytes);
        self
    }

    /// Allocates the runtime and the single context on it.
    ///
    /// # Panics
    /// Panics if the engine cannot allocate, which is fatal rather than
    /// recoverable in this design.
    pub fn build(self) -> Context {
        let runtime = unsafe { q::JS_NewRuntime() };
        assert!(!runtime.is_null(), "engine runtime allocation failed");
        if let Some(bytes) = self.memory_limit {
            unsafe { q::JS_SetMemoryLimit(runtime, bytes as _) };
        }
        if let Some(bytes) = self.gc_threshold {
            unsafe { q::JS_SetGCThreshold(runtime, bytes as _) };
        }
        if let Some(bytes) = self.max_stack_size {
            unsafe { q::JS_SetMaxStackSize(runtime, bytes as _) };
        }
        let context = unsafe { q::JS_NewContext(runtime) };
        assert!(!context.is_null(), "engine context allocation failed");
        debug!("engine context created");
        Context {
            unit: Arc::new(ContextUnit {
                cell: Mutex::new(EngineCell { runtime, context }),
            }),
        }
    }
}
