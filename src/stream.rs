// Stream manager (C6): owns the set of logical media streams (`streamId`s)
// and routes inbound events to the right one. SPEC_FULL.md §4.6.
//
// The source dispatches events through a visitor-style interface with one
// method per event kind; per Design Notes we model that as a trait with a
// no-op default per method (a listener implements only what it cares about)
// plus a tagged-sum `TypedEvent` the manager matches on to call the right
// one -- a dispatch function, not a second visitor hierarchy.

use std::collections::HashMap;

use crate::amf::AMF0Value;
use crate::event::TypedEvent;

/// Per-event-kind callbacks a logical stream can implement. Every method
/// defaults to a no-op, so a stream only overrides the kinds it handles.
pub trait StreamHandler {
    fn on_frame_size(&mut self, _size: u32) {}
    fn on_bytes_read(&mut self, _bytes: u32) {}
    fn on_control_message(&mut self, _event_type: u16, _v1: u32, _v2: i32, _v3: i32) {}
    fn on_downstream_bandwidth(&mut self, _bandwidth: u32) {}
    fn on_upstream_bandwidth(&mut self, _bandwidth: u32, _extra: u8) {}
    fn on_audio_data(&mut self, _bytes: &[u8]) {}
    fn on_video_data(&mut self, _bytes: &[u8]) {}
    fn on_notify(&mut self, _name: &str, _id: f64, _argv: &[AMF0Value]) {}
    fn on_invoke(&mut self, _name: &str, _id: f64, _argv: &[AMF0Value]) {}
}

/// A method an inbound `Invoke` can call by name, per SPEC_FULL.md §4.7.
/// Returns the AMF value to send back as `_result`, or an error message to
/// send back as `_error`'s `description`.
pub type ExposedMethod = Box<dyn FnMut(Vec<AMF0Value>) -> Result<AMF0Value, String> + Send>;

/// One logical RTMP stream: an event sink plus a table of RPC methods
/// exposed to the peer.
pub struct Stream {
    pub stream_id: u32,
    handler: Box<dyn StreamHandler + Send>,
    methods: HashMap<String, ExposedMethod>,
}

impl Stream {
    pub fn new(stream_id: u32, handler: Box<dyn StreamHandler + Send>) -> Self {
        Stream {
            stream_id,
            handler,
            methods: HashMap::new(),
        }
    }

    /// Registers (or replaces) a method inbound `Invoke`s can call by name.
    pub fn expose_method(&mut self, name: impl Into<String>, method: ExposedMethod) {
        self.methods.insert(name.into(), method);
    }

    /// Calls an exposed method, if `name` is registered. `None` means "not
    /// found" -- the caller (the invocation dispatcher) decides what that
    /// means for replying to the peer.
    pub fn call_exposed_method(
        &mut self,
        name: &str,
        args: Vec<AMF0Value>,
    ) -> Option<Result<AMF0Value, String>> {
        self.methods.get_mut(name).map(|method| method(args))
    }

    /// Dispatches one decoded event to this stream's handler. `Invoke`/
    /// `Notify` are forwarded to `on_invoke`/`on_notify` as well as being
    /// available for the invocation dispatcher's own routing -- the handler
    /// callback is for application-level observation (logging, metrics),
    /// not a substitute for `call_exposed_method`.
    pub fn dispatch(&mut self, event: &TypedEvent) {
        match event {
            TypedEvent::FrameSize(size) => self.handler.on_frame_size(*size),
            TypedEvent::BytesRead(bytes) => self.handler.on_bytes_read(*bytes),
            TypedEvent::ControlMessage {
                event_type,
                v1,
                v2,
                v3,
            } => self.handler.on_control_message(*event_type, *v1, *v2, *v3),
            TypedEvent::DownstreamBandwidth(bw) => self.handler.on_downstream_bandwidth(*bw),
            TypedEvent::UpstreamBandwidth { bandwidth, limit_type } => {
                self.handler.on_upstream_bandwidth(*bandwidth, *limit_type)
            }
            TypedEvent::AudioData(bytes) => self.handler.on_audio_data(bytes),
            TypedEvent::VideoData(bytes) => self.handler.on_video_data(bytes),
            TypedEvent::Notify { name, id, argv } => self.handler.on_notify(name, *id, argv),
            TypedEvent::Invoke { name, id, argv } => self.handler.on_invoke(name, *id, argv),
        }
    }
}

/// A `StreamHandler` that does nothing; the default for a stream that only
/// exposes RPC methods and has no interest in raw events.
#[derive(Default)]
pub struct NullStreamHandler;
impl StreamHandler for NullStreamHandler {}

/// Owns every logical stream keyed by `streamId` (SPEC_FULL.md §4.6).
/// Stream 0, the control stream, is built the same way as any other stream
/// -- the session controller installs itself as its handler (SPEC_FULL.md
/// §3 Ownership: "Streams are owned by the stream manager; the session
/// holds a back-reference only for dispatch").
#[derive(Default)]
pub struct StreamManager {
    streams: HashMap<u32, Stream>,
}

impl StreamManager {
    pub fn new() -> Self {
        StreamManager::default()
    }

    /// Creates a new logical stream, replacing any previous stream with the
    /// same id.
    pub fn build_stream(&mut self, stream_id: u32, handler: Box<dyn StreamHandler + Send>) -> &mut Stream {
        self.streams.insert(stream_id, Stream::new(stream_id, handler));
        self.streams.get_mut(&stream_id).expect("just inserted")
    }

    /// Removes a stream. Returns `true` if it existed.
    pub fn close_stream(&mut self, stream_id: u32) -> bool {
        self.streams.remove(&stream_id).is_some()
    }

    pub fn get_mut(&mut self, stream_id: u32) -> Option<&mut Stream> {
        self.streams.get_mut(&stream_id)
    }

    pub fn contains(&self, stream_id: u32) -> bool {
        self.streams.contains_key(&stream_id)
    }

    /// Routes one decoded event to the stream it targets. Returns `false`
    /// if no stream with that id exists (the event is dropped; a truly
    /// unroutable stream id is a protocol-level decision left to the
    /// caller, not this manager).
    pub fn dispatch(&mut self, stream_id: u32, event: &TypedEvent) -> bool {
        match self.streams.get_mut(&stream_id) {
            Some(stream) => {
                stream.dispatch(event);
                true
            }
            None => false,
        }
    }

    pub fn stream_ids(&self) -> Vec<u32> {
        self.streams.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingHandler {
        frame_sizes: Arc<Mutex<Vec<u32>>>,
    }
    impl StreamHandler for RecordingHandler {
        fn on_frame_size(&mut self, size: u32) {
            self.frame_sizes.lock().unwrap().push(size);
        }
    }

    #[test]
    fn build_and_dispatch_routes_to_the_right_stream() {
        let mut manager = StreamManager::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        manager.build_stream(
            1,
            Box::new(RecordingHandler {
                frame_sizes: seen.clone(),
            }),
        );
        manager.build_stream(2, Box::new(NullStreamHandler));

        assert!(manager.dispatch(1, &TypedEvent::FrameSize(4096)));
        assert!(!manager.dispatch(99, &TypedEvent::FrameSize(1)));
        assert_eq!(*seen.lock().unwrap(), vec![4096]);
    }

    #[test]
    fn close_stream_removes_it() {
        let mut manager = StreamManager::new();
        manager.build_stream(5, Box::new(NullStreamHandler));
        assert!(manager.contains(5));
        assert!(manager.close_stream(5));
        assert!(!manager.contains(5));
        assert!(!manager.close_stream(5));
    }

    #[test]
    fn exposed_method_lookup() {
        let mut manager = StreamManager::new();
        let stream = manager.build_stream(1, Box::new(NullStreamHandler));
        stream.expose_method("ping", Box::new(|_args| Ok(AMF0Value::Bool { value: true })));

        let result = stream.call_exposed_method("ping", vec![]).unwrap();
        assert_eq!(result.unwrap(), AMF0Value::Bool { value: true });
        assert!(stream.call_exposed_method("missing", vec![]).is_none());
    }
}
