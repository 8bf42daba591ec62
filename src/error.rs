// Error kinds for the codec and session engine
//
// Every fallible boundary in this crate returns one of the types below rather
// than a bare `Result<T, ()>` or a boxed `dyn Error`. None of these pull in a
// derive-macro error crate: the teacher's own error handling is entirely
// hand-rolled (`Result<T, ()>` throughout `rtmp::command`/`rtmp::data`), so
// the manual `Display`/`Error` impls here follow that grain while actually
// carrying a message.

use std::fmt;

/// Raised while turning a `Header`/`TypedEvent` into bytes.
///
/// Fatal to the message being encoded, never to the session: the caller gets
/// the error back and decides whether to retry, drop the message, or escalate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// A field required for this header size class / event variant was not set.
    FieldNotSet { field: &'static str },
    /// A value was present but of the wrong shape to encode (e.g. a channel id
    /// out of range, or an AMF argument of an unsupported kind).
    WrongType { field: &'static str, reason: String },
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::FieldNotSet { field } => {
                write!(f, "encode error: field not set: {field}")
            }
            EncodeError::WrongType { field, reason } => {
                write!(f, "encode error: wrong type for {field}: {reason}")
            }
        }
    }
}

impl std::error::Error for EncodeError {}

/// Raised when a peer's reply to an outbound invocation cannot be delivered:
/// the connection was lost, or the peer replied with `_error`.
///
/// Non-fatal to the session; propagated only to the caller's pending future.
#[derive(Debug, Clone, PartialEq)]
pub enum CallFailed {
    /// The peer replied `_error`. Carries the AMF info object argument, when
    /// it could be decomposed into the conventional `code`/`description`/`level`
    /// triple (it is not required to be; peers are free to send anything).
    Rejected {
        code: Option<String>,
        description: Option<String>,
        level: Option<String>,
    },
    /// The connection was lost (or the session torn down) before a reply
    /// arrived.
    ConnectionLost,
    /// Too many calls are already awaiting a reply; see `CodecConfig::max_pending_calls`.
    TooManyPendingCalls,
}

impl fmt::Display for CallFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallFailed::Rejected { description, code, .. } => {
                write!(
                    f,
                    "call failed: {}",
                    description
                        .as_deref()
                        .or(code.as_deref())
                        .unwrap_or("unknown error")
                )
            }
            CallFailed::ConnectionLost => write!(f, "call failed: connection lost"),
            CallFailed::TooManyPendingCalls => write!(f, "call failed: too many pending calls"),
        }
    }
}

impl std::error::Error for CallFailed {}

/// Every kind in this enum is, per spec, session-fatal: encountering one at
/// the session boundary drops the transport and transitions to `Closed`.
///
/// `NeedMoreBytes` is the one exception carried in the same enum for
/// convenience of the frame reader's internal control flow: it is not an
/// error at all, it is the suspension signal described in the concurrency
/// model (an `Err` return only because `Result` is the natural vehicle for
/// "stop and come back later" inside a `?`-driven parser).
#[derive(Debug, Clone, PartialEq)]
pub enum CodecError {
    /// Malformed wire data: an out-of-range header byte, a truncated AMF
    /// value, an invalid size class, etc.
    Decode(String),
    /// A bounded-size event had bytes left over after a successful decode.
    TrailingData { expected: usize, actual: usize },
    /// A `datatype` tag with no entry in the event registry.
    UnknownEventType(u8),
    /// `bodyLength` exceeded the configured cap, or a reserved channel id
    /// (0 or 1) was referenced by a chunk header.
    ProtocolViolation(String),
    /// The transport reported a read/write failure.
    Transport(String),
    /// Not enough bytes buffered yet to decode the next header/frame.
    /// Internal to the frame reader; never escapes to `Session` callers.
    NeedMoreBytes { needed: usize },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Decode(reason) => write!(f, "decode error: {reason}"),
            CodecError::TrailingData { expected, actual } => write!(
                f,
                "trailing data error: expected {expected} bytes, decoder consumed {actual}"
            ),
            CodecError::UnknownEventType(tag) => write!(f, "unknown event type: {tag}"),
            CodecError::ProtocolViolation(reason) => write!(f, "protocol violation: {reason}"),
            CodecError::Transport(reason) => write!(f, "transport error: {reason}"),
            CodecError::NeedMoreBytes { needed } => {
                write!(f, "need {needed} more bytes (not an error)")
            }
        }
    }
}

impl std::error::Error for CodecError {}

impl CodecError {
    /// True for the one variant that signals suspension rather than failure.
    pub fn is_suspension(&self) -> bool {
        matches!(self, CodecError::NeedMoreBytes { .. })
    }
}
