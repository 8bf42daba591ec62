// Handshake negotiator (ambient, §6 external interface): a concrete
// implementation of the RTMP handshake, behind a trait the session
// controller depends on instead of the concrete type. A connection cannot
// reach `Streaming` without running one (SPEC_FULL.md's "Out of scope"
// carve-out still ships a real negotiator for that reason), but everything
// above the trait boundary -- the frame reader/writer, the event layer, the
// session state machine -- never references `RtmpHandshake` by name.
//
// Re-architected from the source's callback-driven `start`/`dataReceived`
// + `versionSuccess`/`handshakeSuccess` signals into a poll-style state
// machine: `data_received` returns a `HandshakeOutcome` the caller matches
// on, rather than registering listeners (Design Notes, "Interface
// abstraction for events").

mod crypto;

use crate::error::CodecError;
use crate::log::Logger;

pub use crypto::{generate_s0_s1_s2, RTMP_SIG_SIZE, RTMP_VERSION};

/// Result of feeding bytes to a `HandshakeNegotiator`.
#[derive(Debug)]
pub enum HandshakeOutcome {
    /// Not enough bytes yet; keep waiting on the transport.
    Pending,
    /// C0+C1 validated; `reply` (S0+S1+S2) must be written to the transport.
    /// Corresponds to the source's `versionSuccess()` signal.
    VersionAccepted { reply: Vec<u8> },
    /// C2 received; the handshake is done. `remaining` is any bytes the
    /// peer already pushed past the handshake boundary and must be fed to
    /// the frame reader once streaming starts. Corresponds to the source's
    /// `handshakeSuccess(remainingBytes)` signal.
    Complete { remaining: Vec<u8> },
}

/// External collaborator contract (SPEC_FULL.md §6): the session controller
/// depends only on this trait, constructing a concrete negotiator and
/// driving it with transport bytes until it reports `Complete`.
pub trait HandshakeNegotiator {
    /// Begins the handshake. Idempotent: calling it again resets state.
    fn start(&mut self);

    /// Feeds newly-arrived transport bytes and advances the state machine.
    fn data_received(&mut self, bytes: &[u8]) -> Result<HandshakeOutcome, CodecError>;
}

#[derive(Debug, PartialEq, Eq)]
enum State {
    NotStarted,
    AwaitingC0C1,
    AwaitingC2,
    Done,
}

/// Concrete server-side RTMP handshake: waits for C0 (1 version byte) + C1
/// (1536 bytes), replies with S0+S1+S2, then waits for C2 (1536 bytes).
pub struct RtmpHandshake {
    state: State,
    buffer: Vec<u8>,
    logger: Logger,
}

impl RtmpHandshake {
    pub fn new(logger: Logger) -> Self {
        RtmpHandshake {
            state: State::NotStarted,
            buffer: Vec::new(),
            logger,
        }
    }
}

impl HandshakeNegotiator for RtmpHandshake {
    fn start(&mut self) {
        self.state = State::AwaitingC0C1;
        self.buffer.clear();
    }

    fn data_received(&mut self, bytes: &[u8]) -> Result<HandshakeOutcome, CodecError> {
        if self.state == State::NotStarted {
            return Err(CodecError::ProtocolViolation(
                "handshake data received before start()".to_string(),
            ));
        }

        self.buffer.extend_from_slice(bytes);

        match self.state {
            State::AwaitingC0C1 => {
                let needed = 1 + RTMP_SIG_SIZE;
                if self.buffer.len() < needed {
                    return Ok(HandshakeOutcome::Pending);
                }
                let client_signature = self.buffer[1..needed].to_vec();
                let reply = generate_s0_s1_s2(&client_signature, &self.logger).map_err(|_| {
                    CodecError::ProtocolViolation("handshake signature validation failed".to_string())
                })?;
                self.buffer.drain(0..needed);
                self.state = State::AwaitingC2;
                Ok(HandshakeOutcome::VersionAccepted { reply })
            }
            State::AwaitingC2 => {
                if self.buffer.len() < RTMP_SIG_SIZE {
                    return Ok(HandshakeOutcome::Pending);
                }
                let remaining = self.buffer.split_off(RTMP_SIG_SIZE);
                self.state = State::Done;
                Ok(HandshakeOutcome::Complete { remaining })
            }
            State::Done => Err(CodecError::ProtocolViolation(
                "handshake already complete".to_string(),
            )),
            State::NotStarted => unreachable!("handled above"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_handshake_round_trip() {
        let mut server = RtmpHandshake::new(Logger::new_disabled());
        server.start();

        let mut c0c1 = vec![RTMP_VERSION];
        c0c1.extend(vec![0u8; RTMP_SIG_SIZE]);

        let outcome = server.data_received(&c0c1).unwrap();
        let reply = match outcome {
            HandshakeOutcome::VersionAccepted { reply } => reply,
            other => panic!("expected VersionAccepted, got {other:?}"),
        };
        assert_eq!(reply[0], RTMP_VERSION);

        let mut c2 = vec![0u8; RTMP_SIG_SIZE];
        c2.extend(b"hello streaming bytes");

        let outcome = server.data_received(&c2).unwrap();
        match outcome {
            HandshakeOutcome::Complete { remaining } => {
                assert_eq!(remaining, b"hello streaming bytes");
            }
            other => panic!("expected Complete, got {other:?}"),
        }
    }

    #[test]
    fn suspends_on_incomplete_c0c1() {
        let mut server = RtmpHandshake::new(Logger::new_disabled());
        server.start();
        let outcome = server.data_received(&[RTMP_VERSION, 1, 2, 3]).unwrap();
        assert!(matches!(outcome, HandshakeOutcome::Pending));
    }

    #[test]
    fn data_before_start_is_a_protocol_violation() {
        let mut server = RtmpHandshake::new(Logger::new_disabled());
        assert!(server.data_received(&[0]).is_err());
    }
}
