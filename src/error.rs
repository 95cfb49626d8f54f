use thiserror::Error;

/// Error type shared across the engine.
///
/// Bounds violations and empty-stack conditions are deliberately *not*
/// errors; they are benign no-ops handled at the call site. Only faults
/// the caller must react to live here.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The canvas buffer is locked by an in-flight operation. The gesture
    /// that hit this is dropped, not queued.
    #[error("canvas buffer is busy")]
    CanvasBusy,

    /// A project record declared a size that does not match its contents.
    #[error("corrupt project: {record} record at word {at}: declared size {declared}, actual {actual}")]
    SizeMismatch {
        record: &'static str,
        at: usize,
        declared: usize,
        actual: usize,
    },

    /// A record header carried a type id that is not valid at this
    /// position in the document.
    #[error("corrupt project: unexpected record type {found} at word {at} (expected {expected})")]
    UnexpectedRecord {
        found: u32,
        at: usize,
        expected: &'static str,
    },

    /// The buffer ended mid-record.
    #[error("corrupt project: truncated at word {at} while reading {reading}")]
    Truncated { at: usize, reading: &'static str },
}
