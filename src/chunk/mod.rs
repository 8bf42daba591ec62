// Chunk-level codec: the frame reader (C2), channel demuxer (C3) and frame
// writer (C5) built on top of the header codec (C1). Inbound and outbound
// channel state are owned by the reader and writer respectively -- per-
// direction, disjoint, as required by SPEC_FULL.md §3 Ownership.

mod demux;
mod reader;
mod writer;

pub use demux::ChannelDemuxer;
pub use reader::{Frame, FrameReader};
pub use writer::FrameWriter;

/// A fully reassembled message, independent of how many chunks it took to
/// arrive: `(channelId, streamId, datatype, timestamp, bodyLength, payload)`
/// from SPEC_FULL.md §3. For streamable types (audio, video) one `Message`
/// is emitted per frame, not per logical message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub channel_id: u32,
    pub stream_id: u32,
    pub datatype: u8,
    pub timestamp: u32,
    pub body_length: u32,
    pub payload: Vec<u8>,
}
