// Session controller (C8): owns the connection lifecycle and wires the
// handshake negotiator, frame reader/writer, channel demuxer, stream
// manager and invocation dispatcher into one cooperative, single-threaded
// state machine (SPEC_FULL.md §4.8).
//
// `Session` never shares state across connections -- each one owns its own
// reader/writer/streams/dispatcher outright (§5, Scheduling model). Nothing
// here spawns a thread or takes a lock; it is driven entirely by the two
// calls the transport makes: `data_received` and `close`.

use std::time::{Duration, Instant};

use futures_util::FutureExt;

use crate::amf::AMF0Value;
use crate::chunk::{ChannelDemuxer, FrameReader, FrameWriter, Message};
use crate::config::CodecConfig;
use crate::constants::{channel_for_datatype, CONTROL_STREAM_ID};
use crate::error::CodecError;
use crate::event::{decode_event, encode_event, TypedEvent};
use crate::handshake::{HandshakeNegotiator, HandshakeOutcome};
use crate::invoke::{error_info_object, method_not_found_argv, result_argv, CallResult, InvokeDispatcher};
use crate::log::Logger;
use crate::{log_debug, log_error, log_info, log_warning};
use crate::stream::{NullStreamHandler, Stream, StreamHandler, StreamManager};

use tokio::sync::oneshot;

/// `Init → Handshaking → Streaming → Closed`, per SPEC_FULL.md §4.8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Handshaking,
    Streaming,
    Closed,
}

/// The only shared resource a session touches (§5): a reliable, ordered,
/// bidirectional byte stream. Writes are synchronous from the session's
/// point of view -- the transport is responsible for its own buffering.
pub trait Transport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), CodecError>;
}

/// External application contract (§6): notified exactly once per session,
/// on terminal connection loss (invariant in §5, Cancellation pt. iv).
pub trait Application {
    fn client_disconnected(&mut self, reason: &str);
}

/// Owns one connection end-to-end: the handshake, the chunked codec in both
/// directions, the set of logical streams, and outbound RPC bookkeeping.
pub struct Session<T, A> {
    state: SessionState,
    transport: T,
    application: A,
    handshake: Box<dyn HandshakeNegotiator + Send>,
    reader: FrameReader,
    writer: FrameWriter,
    demux: ChannelDemuxer,
    streams: StreamManager,
    dispatcher: InvokeDispatcher,
    logger: Logger,

    total_bytes_read: u64,
    bytes_since_ack: u64,
    bytes_read_interval: u64,

    /// Guards `run_decode_loop` against re-entrant scheduling: bytes fed in
    /// while a decode loop is already draining the buffer are simply picked
    /// up by that same loop, per §4.8's "idempotent" scheduling rule.
    decoding: bool,
    disconnected_notified: bool,
    last_activity: Instant,
    ping_timeout: Duration,
}

impl<T: Transport, A: Application> Session<T, A> {
    pub fn new(
        transport: T,
        application: A,
        handshake: Box<dyn HandshakeNegotiator + Send>,
        config: &CodecConfig,
        logger: Logger,
    ) -> Self {
        let mut reader = FrameReader::with_max_body_length(config.max_body_length);
        reader.set_frame_size(config.default_frame_size);
        let mut writer = FrameWriter::new();
        writer.set_frame_size(config.default_frame_size);

        Session {
            state: SessionState::Init,
            transport,
            application,
            handshake,
            reader,
            writer,
            demux: ChannelDemuxer::new(),
            streams: StreamManager::new(),
            dispatcher: InvokeDispatcher::new(config.max_pending_calls),
            logger,
            total_bytes_read: 0,
            bytes_since_ack: 0,
            bytes_read_interval: config.bytes_read_interval as u64,
            decoding: false,
            disconnected_notified: false,
            last_activity: Instant::now(),
            ping_timeout: Duration::from_secs(config.ping_timeout_secs as u64),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// `Init → Handshaking`: constructs nothing new (the negotiator was
    /// supplied at construction, per the trait boundary in
    /// `handshake::HandshakeNegotiator`) but starts it running.
    pub fn start(&mut self) {
        assert_eq!(
            self.state,
            SessionState::Init,
            "Session::start called outside Init"
        );
        self.state = SessionState::Handshaking;
        self.handshake.start();
        let logger = &self.logger;
        log_info!(logger, "handshake started");
    }

    /// How long since the transport last delivered bytes. An external
    /// scheduler polls this against `ping_timeout_secs` (SPEC_FULL.md §10)
    /// to decide when a silent connection should be torn down; the session
    /// itself owns no timer.
    pub fn ping_timeout_exceeded(&self) -> bool {
        self.state != SessionState::Closed && self.last_activity.elapsed() > self.ping_timeout
    }

    /// Overrides the inbound bytes-read ack interval. Normally driven by a
    /// peer bandwidth message (`DownstreamBandwidth`); exposed directly for
    /// callers (and tests) that want to pin it without round-tripping a
    /// wire message first.
    pub fn set_bytes_read_interval(&mut self, interval: u32) {
        self.bytes_read_interval = interval as u64;
    }

    pub fn total_bytes_read(&self) -> u64 {
        self.total_bytes_read
    }

    /// Registers a new logical stream, available to the external
    /// application layer once `connect`/`createStream`-equivalent
    /// invocations (out of scope per SPEC_FULL.md §1) decide to build one.
    pub fn build_stream(&mut self, stream_id: u32, handler: Box<dyn StreamHandler + Send>) {
        self.streams.build_stream(stream_id, handler);
    }

    pub fn close_stream(&mut self, stream_id: u32) -> bool {
        self.streams.close_stream(stream_id)
    }

    pub fn stream_mut(&mut self, stream_id: u32) -> Option<&mut Stream> {
        self.streams.get_mut(stream_id)
    }

    /// Feeds bytes the transport has just delivered. Routed to the
    /// handshake negotiator or the chunked codec depending on state; bytes
    /// arriving after `Closed` are dropped (the transport should stop
    /// calling this once it has observed the disconnect, but a late,
    /// already-in-flight read is not itself an error).
    pub fn data_received(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        self.last_activity = Instant::now();
        match self.state {
            SessionState::Init => Err(CodecError::ProtocolViolation(
                "data received before Session::start".to_string(),
            )),
            SessionState::Handshaking => self.handle_handshake_bytes(bytes),
            SessionState::Streaming => {
                self.reader.feed(bytes);
                self.run_decode_loop()
            }
            SessionState::Closed => Ok(()),
        }
    }

    fn handle_handshake_bytes(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        match self.handshake.data_received(bytes) {
            Ok(HandshakeOutcome::Pending) => Ok(()),
            Ok(HandshakeOutcome::VersionAccepted { reply }) => self.write_to_transport(&reply),
            Ok(HandshakeOutcome::Complete { remaining }) => {
                self.enter_streaming();
                if remaining.is_empty() {
                    Ok(())
                } else {
                    self.reader.feed(&remaining);
                    self.run_decode_loop()
                }
            }
            Err(e) => {
                let logger = &self.logger;
                log_error!(logger, format!("handshake failed: {e}"));
                self.close("handshake failed");
                Err(e)
            }
        }
    }

    /// `Handshaking → Streaming`: instantiates stream 0, the control
    /// stream, identified with the session controller itself (§4.6).
    fn enter_streaming(&mut self) {
        self.state = SessionState::Streaming;
        self.streams
            .build_stream(CONTROL_STREAM_ID, Box::new(NullStreamHandler));
        let logger = &self.logger;
        log_info!(logger, "handshake complete, now streaming");
    }

    fn run_decode_loop(&mut self) -> Result<(), CodecError> {
        if self.decoding {
            // Already draining; these bytes were appended to the same
            // buffer the running loop reads from, so nothing is lost.
            return Ok(());
        }
        self.decoding = true;
        let result = self.drain_frames();
        self.decoding = false;
        result
    }

    fn drain_frames(&mut self) -> Result<(), CodecError> {
        loop {
            match self.reader.next_frame() {
                Ok(frame) => {
                    // Bytes-read acks count everything consumed from the
                    // transport, header included, not just the payload
                    // (SPEC_FULL.md §4.8, S5).
                    let frame_bytes = frame.consumed as u64;
                    if let Some(message) = self.demux.push_frame(frame) {
                        if let Err(e) = self.handle_message(message) {
                            self.close(&format!("fatal decode error: {e}"));
                            return Err(e);
                        }
                    }
                    self.on_bytes_read(frame_bytes);
                }
                Err(e) if e.is_suspension() => return Ok(()),
                Err(e) => {
                    let logger = &self.logger;
                    log_error!(logger, format!("fatal decode error: {e}"));
                    self.close(&format!("fatal decode error: {e}"));
                    return Err(e);
                }
            }
        }
    }

    /// Every `bytes_read_interval` inbound bytes, emits a `BytesRead`
    /// message on the control stream (§4.8, S5).
    fn on_bytes_read(&mut self, n: u64) {
        self.total_bytes_read += n;
        if self.bytes_read_interval == 0 {
            return;
        }
        self.bytes_since_ack += n;
        if self.bytes_since_ack >= self.bytes_read_interval {
            self.bytes_since_ack = 0;
            let ack = TypedEvent::BytesRead(self.total_bytes_read as u32);
            let _ = self.send_event(CONTROL_STREAM_ID, ack);
        }
    }

    fn handle_message(&mut self, message: Message) -> Result<(), CodecError> {
        let Message {
            stream_id,
            datatype,
            payload,
            ..
        } = message;
        // `decode_event` is `async` to honor the suspension model (§9), but
        // by the time a message reaches here its body is fully buffered by
        // the channel demuxer -- it never actually awaits.
        let event = decode_event(datatype, &payload)
            .now_or_never()
            .expect("decode_event never suspends once its payload is fully buffered")?;
        self.handle_event(stream_id, event)
    }

    /// Routes one decoded event. Low-level control types are handled by the
    /// controller itself and never reach user streams (§4.8); everything
    /// else is dispatched to the target stream by id.
    fn handle_event(&mut self, stream_id: u32, event: TypedEvent) -> Result<(), CodecError> {
        match &event {
            TypedEvent::FrameSize(size) => {
                self.reader.set_frame_size(*size as usize);
                let logger = &self.logger;
                log_debug!(logger, format!("peer set frame size to {size}"));
                Ok(())
            }
            TypedEvent::BytesRead(bytes) => {
                let logger = &self.logger;
                log_debug!(logger, format!("peer acknowledged {bytes} bytes read"));
                Ok(())
            }
            TypedEvent::DownstreamBandwidth(bw) => {
                let logger = &self.logger;
                log_debug!(logger, format!("peer set ack window to {bw} bytes"));
                self.bytes_read_interval = *bw as u64;
                Ok(())
            }
            TypedEvent::UpstreamBandwidth { bandwidth, limit_type } => {
                let logger = &self.logger;
                log_debug!(
                    logger,
                    format!("peer advertised upstream bandwidth {bandwidth} (limit type {limit_type})")
                );
                Ok(())
            }
            TypedEvent::Invoke { name, id, argv } => {
                if self.dispatcher.handle_reply(name, *id, argv) {
                    return Ok(());
                }
                let name = name.clone();
                let id = *id;
                let argv = argv.clone();
                self.streams.dispatch(stream_id, &event);
                self.handle_invoke(stream_id, &name, id, argv)
            }
            _ => {
                self.streams.dispatch(stream_id, &event);
                Ok(())
            }
        }
    }

    /// Inbound RPC dispatch once the invocation dispatcher has ruled out a
    /// reply to one of our own calls (§4.7).
    fn handle_invoke(
        &mut self,
        stream_id: u32,
        name: &str,
        id: f64,
        argv: Vec<AMF0Value>,
    ) -> Result<(), CodecError> {
        let outcome = self
            .streams
            .get_mut(stream_id)
            .and_then(|stream| stream.call_exposed_method(name, argv));

        match outcome {
            Some(Ok(value)) => {
                if id != 0.0 {
                    self.send_invoke(stream_id, "_result", id, result_argv(value))?;
                }
            }
            Some(Err(message)) => {
                if id != 0.0 {
                    let argv = vec![
                        AMF0Value::Null,
                        error_info_object("NetConnection.Call.Failed", &message, "error"),
                    ];
                    self.send_invoke(stream_id, "_error", id, argv)?;
                }
            }
            None => {
                if id != 0.0 {
                    let logger = &self.logger;
                    log_warning!(logger, format!("no handler exposed for method {name:?}"));
                    self.send_invoke(stream_id, "_error", id, method_not_found_argv(name))?;
                }
                // id == 0: no reply expected, fail silently per §4.7.
            }
        }
        Ok(())
    }

    /// Outbound `call(streamId, name, args) → Future` (§4.7). The returned
    /// receiver resolves once the peer replies `_result`/`_error`, or is
    /// rejected with `ConnectionLost` on teardown (invariant 6, §8).
    pub fn call(
        &mut self,
        stream_id: u32,
        name: &str,
        args: Vec<AMF0Value>,
    ) -> Result<oneshot::Receiver<CallResult>, crate::error::CallFailed> {
        let (id, rx) = self.dispatcher.begin_call()?;
        let event = TypedEvent::Invoke {
            name: name.to_string(),
            id: id as f64,
            argv: args,
        };
        let _ = self.send_event(stream_id, event);
        Ok(rx)
    }

    /// Outbound unacknowledged `Notify` (§3).
    pub fn notify(&mut self, stream_id: u32, name: &str, args: Vec<AMF0Value>) -> Result<(), CodecError> {
        self.send_event(
            stream_id,
            TypedEvent::Notify {
                name: name.to_string(),
                id: 0.0,
                argv: args,
            },
        )
    }

    fn send_invoke(
        &mut self,
        stream_id: u32,
        name: &str,
        id: f64,
        argv: Vec<AMF0Value>,
    ) -> Result<(), CodecError> {
        self.send_event(
            stream_id,
            TypedEvent::Invoke {
                name: name.to_string(),
                id,
                argv,
            },
        )
    }

    /// Encodes and queues one event, choosing its channel by datatype
    /// (§4.5 leaves channel allocation to the caller; `channel_for_datatype`
    /// is the session's own fixed policy). An encode failure is fatal only
    /// to this one event (§7); a transport write failure tears the session
    /// down.
    fn send_event(&mut self, stream_id: u32, event: TypedEvent) -> Result<(), CodecError> {
        let datatype = event.datatype();
        let payload = match encode_event(&event) {
            Ok(payload) => payload,
            Err(e) => {
                let logger = &self.logger;
                log_error!(logger, format!("failed to encode outbound event: {e}"));
                return Ok(());
            }
        };

        let channel_id = channel_for_datatype(datatype);
        self.writer
            .enqueue(channel_id, datatype, stream_id, 0, payload)
            .map_err(|e| CodecError::ProtocolViolation(format!("frame writer rejected event: {e}")))?;

        let wire = self.writer.drain_all();
        self.write_to_transport(&wire)
    }

    fn write_to_transport(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        if let Err(e) = self.transport.write(bytes) {
            let logger = &self.logger;
            log_error!(logger, format!("transport write failed: {e}"));
            self.close("transport write failed");
            return Err(e);
        }
        Ok(())
    }

    /// Any state `→ Closed`: tears down the reader/writer state, cancels
    /// every pending call exactly once, releases every stream, and notifies
    /// the application exactly once (§5, Cancellation).
    pub fn close(&mut self, reason: &str) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;
        self.dispatcher.cancel_all();
        for stream_id in self.streams.stream_ids() {
            self.streams.close_stream(stream_id);
        }
        if !self.disconnected_notified {
            self.disconnected_notified = true;
            self.application.client_disconnected(reason);
        }
        let logger = &self.logger;
        log_info!(logger, format!("session closed: {reason}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::{RtmpHandshake, RTMP_SIG_SIZE, RTMP_VERSION};
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct RecordingTransport {
        written: Arc<Mutex<Vec<u8>>>,
        fail_next_write: Arc<Mutex<bool>>,
    }

    impl RecordingTransport {
        fn take(&self) -> Vec<u8> {
            std::mem::take(&mut self.written.lock().unwrap())
        }
    }

    impl Transport for RecordingTransport {
        fn write(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
            if std::mem::take(&mut *self.fail_next_write.lock().unwrap()) {
                return Err(CodecError::Transport("simulated failure".to_string()));
            }
            self.written.lock().unwrap().extend_from_slice(bytes);
            Ok(())
        }
    }

    #[derive(Default, Clone)]
    struct RecordingApplication {
        disconnects: Arc<Mutex<Vec<String>>>,
    }

    impl Application for RecordingApplication {
        fn client_disconnected(&mut self, reason: &str) {
            self.disconnects.lock().unwrap().push(reason.to_string());
        }
    }

    fn new_session() -> (Session<RecordingTransport, RecordingApplication>, RecordingTransport, RecordingApplication) {
        let transport = RecordingTransport::default();
        let application = RecordingApplication::default();
        let logger = Logger::new_disabled();
        let session = Session::new(
            transport.clone(),
            application.clone(),
            Box::new(RtmpHandshake::new(Logger::new_disabled())),
            &CodecConfig::default(),
            logger,
        );
        (session, transport, application)
    }

    fn run_handshake(session: &mut Session<RecordingTransport, RecordingApplication>, transport: &RecordingTransport) {
        session.start();
        assert_eq!(session.state(), SessionState::Handshaking);

        let mut c0c1 = vec![RTMP_VERSION];
        c0c1.extend(vec![0u8; RTMP_SIG_SIZE]);
        session.data_received(&c0c1).unwrap();
        assert!(!transport.take().is_empty(), "S0S1S2 reply expected");

        let c2 = vec![0u8; RTMP_SIG_SIZE];
        session.data_received(&c2).unwrap();
        assert_eq!(session.state(), SessionState::Streaming);
    }

    #[test]
    fn lifecycle_reaches_streaming() {
        let (mut session, transport, _app) = new_session();
        run_handshake(&mut session, &transport);
    }

    #[test]
    fn data_before_start_is_a_protocol_violation() {
        let (mut session, _t, _a) = new_session();
        assert!(session.data_received(&[0]).is_err());
    }

    #[test]
    fn frame_size_control_message_updates_reader() {
        let (mut session, transport, _app) = new_session();
        run_handshake(&mut session, &transport);

        let mut writer = FrameWriter::new();
        let payload = encode_event(&TypedEvent::FrameSize(4096)).unwrap();
        writer
            .enqueue(crate::constants::CHANNEL_PROTOCOL_CONTROL, crate::constants::TYPE_FRAME_SIZE, 0, 0, payload)
            .unwrap();
        let wire = writer.drain_all();

        session.data_received(&wire).unwrap();
        assert_eq!(session.reader.frame_size(), 4096);
    }

    #[test]
    fn bytes_read_ack_emitted_after_interval_matches_s5() {
        use crate::header::{encode_header, Header};

        let (mut session, transport, _app) = new_session();
        run_handshake(&mut session, &transport);
        session.set_bytes_read_interval(8);
        transport.take();

        // One 16-byte chunk: a 12-byte absolute header plus a 4-byte
        // payload. The ack counts everything consumed from the stream, not
        // just the payload -- 16 bytes total, crossing the interval of 8.
        let header = Header::absolute(3, 0, crate::constants::TYPE_AUDIO_DATA, 4, 1);
        let mut wire = encode_header(&header).unwrap();
        assert_eq!(wire.len(), 12, "absolute header must be the 12-byte size class");
        wire.extend_from_slice(&[0u8; 4]);
        assert_eq!(wire.len(), 16);

        session.data_received(&wire).unwrap();
        let sent = transport.take();
        assert!(!sent.is_empty(), "expected an outbound BytesRead ack");

        let mut reader = FrameReader::new();
        reader.feed(&sent);
        let frame = reader.next_frame().unwrap();
        let event = decode_event(frame.header.datatype.unwrap(), &frame.payload)
            .now_or_never()
            .unwrap()
            .unwrap();
        assert_eq!(event, TypedEvent::BytesRead(16));
    }

    #[test]
    fn unregistered_invoke_replies_with_method_not_found_and_preserves_non_ascii() {
        let (mut session, transport, _app) = new_session();
        run_handshake(&mut session, &transport);
        transport.take();

        let mut writer = FrameWriter::new();
        let payload = encode_event(&TypedEvent::Invoke {
            name: "дак".to_string(),
            id: 2.0,
            argv: vec![],
        })
        .unwrap();
        writer.enqueue(3, crate::constants::TYPE_INVOKE, 0, 0, payload).unwrap();
        let wire = writer.drain_all();

        session.data_received(&wire).unwrap();
        let sent = transport.take();
        assert!(!sent.is_empty());

        let mut reader = FrameReader::new();
        reader.feed(&sent);
        let frame = reader.next_frame().unwrap();
        assert!(frame.complete);
        let event = decode_event(frame.header.datatype.unwrap(), &frame.payload)
            .now_or_never()
            .unwrap()
            .unwrap();
        match event {
            TypedEvent::Invoke { name, id, argv } => {
                assert_eq!(name, "_error");
                assert_eq!(id, 2.0);
                let info = &argv[1];
                assert_eq!(
                    info.get_object_property("description").unwrap().get_string(),
                    "Method not found (дак)"
                );
            }
            other => panic!("expected Invoke, got {other:?}"),
        }
    }

    #[test]
    fn transport_failure_cancels_pending_calls_and_notifies_once() {
        let (mut session, transport, app) = new_session();
        run_handshake(&mut session, &transport);

        let rx = session.call(0, "play", vec![]).unwrap();
        *transport.fail_next_write.lock().unwrap() = true;

        // Trigger another outbound send to hit the failing write.
        let _ = session.notify(0, "anything", vec![]);

        assert_eq!(session.state(), SessionState::Closed);
        let result = rx.try_recv();
        assert!(matches!(
            result,
            Ok(Err(crate::error::CallFailed::ConnectionLost))
        ));
        assert_eq!(app.disconnects.lock().unwrap().len(), 1);
    }

    #[test]
    fn close_is_idempotent_for_disconnect_notification() {
        let (mut session, transport, app) = new_session();
        run_handshake(&mut session, &transport);
        session.close("first");
        session.close("second");
        assert_eq!(app.disconnects.lock().unwrap().len(), 1);
    }
}
