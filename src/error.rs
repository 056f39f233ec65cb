//! Library error types.

use std::fmt;

/// A hessian2 Result, normally returning a hessian2 [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A hessian2 decoding error. Every variant carries `pos`, the input
/// offset at which the problem was detected.
///
/// Encoding cannot fail: every [`Value`](crate::Value) has a wire
/// representation, so the encoder returns bytes directly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// The dispatch byte is not assigned to any value kind, or a tag
    /// appeared somewhere its kind is not allowed (e.g. a terminator
    /// where a value was expected, or a non-string where a type name
    /// was required).
    BadTag {
        /// Offset of the offending byte
        pos: usize,
        /// The byte itself
        tag: u8,
    },
    /// Input ended before the current construct was complete.
    LengthTooShort {
        /// Offset where the read was attempted
        pos: usize,
        /// What was being decoded when the input ran out
        step: &'static str,
        /// Bytes the construct still required
        expected: usize,
        /// Bytes actually remaining
        actual: usize,
    },
    /// A back-reference named an index at or past the end of the
    /// reference table.
    BadRef {
        /// Offset of the reference's index field
        pos: usize,
        /// The index read from the wire
        index: i64,
        /// Reference table size at that point
        len: usize,
    },
    /// A type reference named an index at or past the end of the
    /// type-name table.
    BadTypeIndex {
        /// Offset of the type's index field
        pos: usize,
        /// The index read from the wire
        index: i64,
        /// Type-name table size at that point
        len: usize,
    },
    /// An object instance named a class-definition index at or past
    /// the end of the definitions table.
    BadClassIndex {
        /// Offset of the definition index
        pos: usize,
        /// The index read from the wire
        index: i64,
        /// Definitions table size at that point
        len: usize,
    },
    /// A string chunk's declared character count could not be
    /// satisfied by the remaining bytes, or the bytes were not valid
    /// UTF-8.
    BadUtf8 {
        /// Offset of the start of the offending chunk data
        pos: usize,
    },
    /// Value nesting exceeded [`MAX_DEPTH`](crate::MAX_DEPTH).
    DepthLimit {
        /// Offset of the tag that crossed the limit
        pos: usize,
    },
}

impl Error {
    /// The input offset at which the error was detected.
    pub fn position(&self) -> usize {
        match *self {
            Error::BadTag { pos, .. } => pos,
            Error::LengthTooShort { pos, .. } => pos,
            Error::BadRef { pos, .. } => pos,
            Error::BadTypeIndex { pos, .. } => pos,
            Error::BadClassIndex { pos, .. } => pos,
            Error::BadUtf8 { pos } => pos,
            Error::DepthLimit { pos } => pos,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::BadTag { pos, tag } => {
                write!(f, "unrecognized tag byte 0x{:02x} at offset {}", tag, pos)
            }
            Error::LengthTooShort {
                pos,
                step,
                expected,
                actual,
            } => write!(
                f,
                "input too short at offset {}: needed {} more bytes but had {} on step [{}]",
                pos, expected, actual, step
            ),
            Error::BadRef { pos, index, len } => write!(
                f,
                "back-reference {} at offset {} is outside the reference table (size {})",
                index, pos, len
            ),
            Error::BadTypeIndex { pos, index, len } => write!(
                f,
                "type index {} at offset {} is outside the type table (size {})",
                index, pos, len
            ),
            Error::BadClassIndex { pos, index, len } => write!(
                f,
                "class-definition index {} at offset {} is outside the definitions table (size {})",
                index, pos, len
            ),
            Error::BadUtf8 { pos } => write!(
                f,
                "string chunk at offset {} is not satisfiable as UTF-8",
                pos
            ),
            Error::DepthLimit { pos } => {
                write!(f, "value nesting exceeded the depth limit at offset {}", pos)
            }
        }
    }
}

impl std::error::Error for Error {}
