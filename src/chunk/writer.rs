// Frame writer / encoder (C5): mirrors the reader. Slices outbound messages
// into frames, compresses headers with the same delta scheme, and
// interleaves frames round-robin across channels so one large media message
// never starves another channel's control traffic (SPEC_FULL.md §4.5).

use std::collections::{HashMap, VecDeque};

use crate::constants::{CHANNEL_MAX, CHANNEL_MIN, DEFAULT_FRAME_SIZE};
use crate::error::EncodeError;
use crate::header::{diff_headers, encode_header, Header};

struct PendingMessage {
    /// Absolute header this message will be recorded under once sent.
    header: Header,
    payload: Vec<u8>,
    offset: usize,
    started: bool,
}

pub struct FrameWriter {
    /// Last absolute header sent on each channel, for delta compression.
    last_headers: HashMap<u32, Header>,
    frame_size: usize,
    queues: HashMap<u32, VecDeque<PendingMessage>>,
    /// Round-robin cursor: channel ids with at least one queued message,
    /// in the order they should next be serviced.
    order: VecDeque<u32>,
}

impl Default for FrameWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameWriter {
    pub fn new() -> Self {
        FrameWriter {
            last_headers: HashMap::new(),
            frame_size: DEFAULT_FRAME_SIZE,
            queues: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn set_frame_size(&mut self, size: usize) {
        self.frame_size = size;
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Queues a message for transmission on `channel_id`. Messages queued on
    /// the same channel are emitted in the order enqueued; messages on
    /// different channels are interleaved round-robin by `next_chunk`.
    pub fn enqueue(
        &mut self,
        channel_id: u32,
        datatype: u8,
        stream_id: u32,
        timestamp: u32,
        payload: Vec<u8>,
    ) -> Result<(), EncodeError> {
        if !(CHANNEL_MIN..CHANNEL_MAX).contains(&channel_id) {
            return Err(EncodeError::WrongType {
                field: "channel_id",
                reason: format!("{channel_id} is outside the valid channel range"),
            });
        }

        let header = Header::absolute(channel_id, timestamp, datatype, payload.len() as u32, stream_id);
        let queue = self.queues.entry(channel_id).or_default();
        let was_idle = queue.is_empty();
        queue.push_back(PendingMessage {
            header,
            payload,
            offset: 0,
            started: false,
        });
        if was_idle {
            self.order.push_back(channel_id);
        }
        Ok(())
    }

    /// True if there is nothing left to send on any channel.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Emits the next single chunk (header + up to `frame_size` payload
    /// bytes) in round-robin order across channels with pending work.
    /// Returns `None` once every queue is drained.
    pub fn next_chunk(&mut self) -> Option<Vec<u8>> {
        let channel_id = self.order.pop_front()?;
        let queue = self.queues.get_mut(&channel_id)?;
        let message = queue.front_mut()?;

        let chunk_header = if !message.started {
            message.started = true;
            match self.last_headers.get(&channel_id) {
                Some(prev) => diff_headers(prev, &message.header),
                None => message.header.clone(),
            }
        } else {
            Header::continuation(channel_id)
        };

        let mut out = encode_header(&chunk_header)
            .expect("writer only ever builds headers matching one of the four size classes");

        let remaining = message.payload.len() - message.offset;
        let take = remaining.min(self.frame_size);
        out.extend_from_slice(&message.payload[message.offset..message.offset + take]);
        message.offset += take;

        let message_done = message.offset >= message.payload.len();
        if message_done {
            self.last_headers.insert(channel_id, message.header.clone());
            queue.pop_front();
        }

        if !message_done || !queue.is_empty() {
            self.order.push_back(channel_id);
        }

        Some(out)
    }

    /// Drains every queued chunk into one buffer. Convenience for callers
    /// that don't need true interleaving (e.g. tests, or a session with a
    /// single outstanding message).
    pub fn drain_all(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = self.next_chunk() {
            out.extend(chunk);
        }
        out
    }
}
