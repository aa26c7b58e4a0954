//! Error types shared by the zone, the containers, the writer and the reader.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The zone (or the output buffer) refused to hand out more memory.
    #[error("allocation of {requested} bytes refused by zone `{zone}`")]
    AllocationFailure { zone: String, requested: usize },

    /// Malformed JSON text. `line` and `column` are 1-based, `offset` is a
    /// byte index into the input.
    #[error("JSON parse error at line {line} column {column} (offset {offset}): {message}")]
    Syntax {
        message: String,
        offset: usize,
        line: usize,
        column: usize,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// I/O error on a caller supplied stream.
    #[error("I/O error: {0}")]
    Stream(#[source] io::Error),
}

impl Error {
    pub fn is_allocation(&self) -> bool {
        matches!(self, Self::AllocationFailure { .. })
    }
    pub fn is_syntax(&self) -> bool {
        matches!(self, Self::Syntax { .. })
    }
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Stream(_))
    }
}

/// A move that did not happen. The callee hands the input back so the caller
/// still owns it and decides what to do with it.
#[derive(Debug)]
pub struct Rejected<T> {
    pub value: T,
    pub error: Error,
}

impl<T> Rejected<T> {
    pub(crate) fn new(value: T, error: Error) -> Self {
        Self { value, error }
    }
    pub fn into_error(self) -> Error {
        self.error
    }
}

impl<T: core::fmt::Debug> core::fmt::Display for Rejected<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "move rejected: {}", self.error)
    }
}

impl<T: core::fmt::Debug> std::error::Error for Rejected<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_syntax_display_has_position() {
        let err = Error::Syntax {
            message: "expected `:`".into(),
            offset: 7,
            line: 2,
            column: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("line 2 column 3"), "{}", msg);
        assert!(msg.contains("expected `:`"), "{}", msg);
        assert!(err.is_syntax() && !err.is_io());
    }

    #[test]
    fn test_io_display_has_path() {
        let err = Error::Io {
            path: "/nope/x.json".into(),
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };
        assert!(err.to_string().contains("/nope/x.json"));
        assert!(err.is_io());
    }
}
