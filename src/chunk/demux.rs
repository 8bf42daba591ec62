// Channel demuxer (C3): buffers frame payloads per channel until a message
// completes, then releases the assembled bytes to the message codec.
// Streamable types (audio, video) bypass buffering entirely -- each frame is
// released immediately with its own metadata, preserving low-latency media
// delivery (SPEC_FULL.md §4.3).

use std::collections::HashMap;

use crate::chunk::reader::Frame;
use crate::chunk::Message;
use crate::constants::is_streamable_type;

#[derive(Default)]
pub struct ChannelDemuxer {
    buckets: HashMap<u32, Vec<u8>>,
}

impl ChannelDemuxer {
    pub fn new() -> Self {
        ChannelDemuxer::default()
    }

    /// Feeds one frame from the frame reader. Returns `Some(message)` once a
    /// whole message is available -- immediately for streamable types, once
    /// `frame.complete` for everything else.
    pub fn push_frame(&mut self, frame: Frame) -> Option<Message> {
        let datatype = frame
            .header
            .datatype
            .expect("frame reader always resolves datatype before emitting a frame");
        let stream_id = frame
            .header
            .stream_id
            .expect("frame reader always resolves stream_id before emitting a frame");
        let timestamp = frame
            .header
            .timestamp
            .expect("frame reader always resolves timestamp before emitting a frame");

        if is_streamable_type(datatype) {
            return Some(Message {
                channel_id: frame.channel_id,
                stream_id,
                datatype,
                timestamp,
                body_length: frame.payload.len() as u32,
                payload: frame.payload,
            });
        }

        let bucket = self.buckets.entry(frame.channel_id).or_default();
        bucket.extend_from_slice(&frame.payload);

        if !frame.complete {
            return None;
        }

        let payload = self.buckets.remove(&frame.channel_id).unwrap_or_default();
        Some(Message {
            channel_id: frame.channel_id,
            stream_id,
            datatype,
            timestamp,
            body_length: payload.len() as u32,
            payload,
        })
    }
}
