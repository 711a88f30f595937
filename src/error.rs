use thiserror::Error;

/// Errors surfaced by the bridge.
///
/// There is no recovery or retry in this layer; every failure is
/// reported to the caller as one of these kinds, and a failed operation
/// leaves no engine-side state behind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The engine raised an exception. The message is the engine's own
    /// string rendering of the thrown value, which includes the
    /// out-of-memory error raised once a configured memory limit is
    /// exceeded.
    #[error("{0}")]
    Script(String),

    /// A host value the bridge refuses to hand to the engine, reported
    /// before anything is allocated engine-side. `position` is the
    /// 0-based index in the argument list.
    #[error("unsupported argument at position {position}: {kind}")]
    Argument {
        position: usize,
        kind: &'static str,
    },

    /// The engine produced a value tag outside its documented set. With
    /// a conformant engine this cannot happen.
    #[error("unrecognized engine value tag {0}")]
    UnknownTag(i64),
}

pub type Result<T> = std::result::Result<T, Error>;
