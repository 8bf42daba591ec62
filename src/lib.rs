//! RTMP chunked codec and session engine: header compression, chunk framing
//! and multiplexing, the typed message/event layer, and the session
//! controller that drives a single connection through its lifecycle.
//!
//! This crate is the protocol core only -- the handshake's cryptographic
//! digest logic is carried (it's real, load-bearing code the session
//! controller needs to drive `Init -> Handshaking -> Streaming`), but
//! everything above invocation dispatch (auth, publish/subscribe policy,
//! stream naming) is left to the embedding application. See `SPEC_FULL.md`
//! for the full component breakdown.

pub mod amf;
pub mod chunk;
pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod handshake;
pub mod header;
pub mod invoke;
pub mod log;
pub mod session;
pub mod stream;
pub mod utils;

pub use chunk::Message;
pub use config::CodecConfig;
pub use error::{CallFailed, CodecError, EncodeError};
pub use event::TypedEvent;
pub use header::Header;
pub use session::{Application, Session, SessionState, Transport};
pub use stream::{Stream, StreamHandler, StreamManager};
