//! Error types for encoding, decoding and option parsing.
//!
//! Every error is fatal for the single `encode`/`decode` call it comes from:
//! the caller either gets a complete value or one of these.

use thiserror::Error;

/// Errors raised while writing a value graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// The object's type has no registry record, not even through a fallback,
    /// and the resolver did not claim it.
    #[error("no plankton type record registered for `{type_name}`")]
    UnregisteredType {
        /// Rust type name of the offending record.
        type_name: &'static str,
    },
    /// A typed payload or header function was handed a record of another type.
    /// Happens when a fallback chain routes a type to a record whose custom
    /// functions expect the parent type.
    #[error("type record for `{expected}` cannot read an instance of `{found}`")]
    RecordMismatch {
        /// Type the record's functions were written for.
        expected: &'static str,
        /// Type of the instance being encoded.
        found: &'static str,
    },
    /// A record listed a field that the instance does not expose.
    #[error("`{type_name}` has no readable field `{field}`")]
    MissingField {
        /// Rust type name of the record.
        type_name: &'static str,
        /// Field name from the registered field list.
        field: &'static str,
    },
    /// The value is nested deeper than [`MAX_DEPTH`](crate::codec::MAX_DEPTH).
    #[error("value nested deeper than {limit} levels")]
    TooDeep {
        /// The nesting limit.
        limit: usize,
    },
    /// Replacement functions kept producing new objects.
    #[error("replacement chain for `{type_name}` did not terminate")]
    ReplacementLoop {
        /// Type whose replacement was being resolved.
        type_name: &'static str,
    },
}

/// Errors raised while reading a value graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// A tag byte outside the ten defined tags.
    #[error("unknown tag {tag:#04x} at byte {offset}")]
    UnknownTag {
        /// The offending byte.
        tag: u8,
        /// Its position in the buffer.
        offset: usize,
    },
    /// The buffer ended in the middle of a value.
    #[error("input truncated at byte {offset}")]
    Truncated {
        /// Position at which more input was needed.
        offset: usize,
    },
    /// A string's bytes are not valid UTF-8.
    #[error("string at byte {offset} is not valid UTF-8")]
    InvalidUtf8 {
        /// Position of the string's first byte.
        offset: usize,
    },
    /// An object header matched no record and no default constructor is set.
    #[error("no type registered for object header {header}")]
    UnknownHeader {
        /// Stringified header value.
        header: String,
    },
    /// A reference pointed at a slot that was never filled in.
    #[error("reference offset {offset} points at unfinished slot {slot}")]
    DanglingReference {
        /// Offset as read from the stream.
        offset: u32,
        /// Slot index computed from it, negative when it precedes slot 0.
        slot: i64,
    },
    /// The access function could not produce a value for an environment key.
    #[error("environment key {key} could not be resolved")]
    ResolverMismatch {
        /// Stringified key.
        key: String,
    },
    /// A decoded payload could not be applied to the instance.
    #[error("invalid payload for `{type_name}`: {reason}")]
    InvalidPayload {
        /// Rust type name of the instance.
        type_name: &'static str,
        /// What was wrong with it.
        reason: String,
    },
    /// Values are nested deeper than [`MAX_DEPTH`](crate::codec::MAX_DEPTH).
    #[error("value at byte {offset} is nested too deeply")]
    TooDeep {
        /// Position of the value that exceeded the limit.
        offset: usize,
    },
    /// Input remained after the top-level value.
    #[error("{remaining} trailing bytes after the top-level value")]
    TrailingBytes {
        /// Number of unread bytes.
        remaining: usize,
    },
    /// The input was not valid base64.
    #[error("invalid base64 input: {0}")]
    Base64(String),
    /// A `p64/` string was expected.
    #[error("expected a `p64/` prefixed string")]
    MissingPrefix,
}

impl DecodeError {
    pub(crate) fn invalid_payload(type_name: &'static str, reason: impl Into<String>) -> Self {
        DecodeError::InvalidPayload {
            type_name,
            reason: reason.into(),
        }
    }
}

/// Errors raised while building a [`Registry`](crate::Registry).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Two records claim the same decode header.
    #[error("header {header} is registered by both `{first}` and `{second}`")]
    DuplicateHeader {
        /// The contested header.
        header: String,
        /// Type registered first.
        first: &'static str,
        /// Type registered second.
        second: &'static str,
    },
    /// The same Rust type was registered twice.
    #[error("type `{type_name}` is registered twice")]
    DuplicateType {
        /// The duplicated type.
        type_name: &'static str,
    },
    /// A fallback chain loops back on itself.
    #[error("fallback chain starting at `{type_name}` is cyclic")]
    CyclicFallback {
        /// Type at which the cycle was detected.
        type_name: &'static str,
    },
}

/// Errors raised while parsing option syntax.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionsError {
    /// An unexpected character or token.
    #[error("unexpected `{0}` in options")]
    Syntax(String),
    /// A `"` without its closing quote.
    #[error("unterminated string in options")]
    UnterminatedString,
    /// The options blob could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// The options could not be encoded.
    #[error(transparent)]
    Encode(#[from] EncodeError),
}
