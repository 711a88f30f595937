//! Isolated QuickJS contexts for Rust hosts.
//!
//! Each [`Context`] owns a private engine runtime, so contexts are
//! independent units of isolation that may run in parallel on separate
//! threads. Values cross the boundary as [`Value`]; engine objects and
//! functions come back as [`Object`] handles that keep their context
//! alive for as long as they exist. Engine-raised errors arrive as
//! [`Error::Script`] carrying the engine's own message.
//!
//! ```
//! use qjsbox::{Context, Value};
//!
//! let ctx = Context::new();
//! assert_eq!(ctx.eval("1 + 1").unwrap(), Value::Int(2));
//!
//! let f = ctx
//!     .eval("function inc(x) { return x + 1 } inc")
//!     .unwrap()
//!     .into_object()
//!     .unwrap();
//! assert_eq!(f.call(&[Value::Int(41)]).unwrap(), Value::Int(42));
//! ```

mod capi;
mod context;
mod conversion;
mod error;
mod exception;
mod object;
mod value;

pub use context::{Context, ContextBuilder, EvalFlags, MemoryUsage};
pub use error::{Error, Result};
pub use object::Object;
pub use value::Value;
