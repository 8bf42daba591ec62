// Chunk header codec (C1): the basic header byte, the four chunk message
// header size classes, and the delta/fold operations the frame reader and
// writer build on.

mod codec;
mod diff;
mod size_class;

pub use codec::{decode_header, encode_header};
pub use diff::{apply, diff_headers};
pub use size_class::{
    decode_header_byte, encode_header_byte, get_header_size, get_header_size_index,
};

/// A chunk header, absolute or relative.
///
/// `relative` headers carry only the fields that differ from the previous
/// absolute header seen on the same channel; `None` means "same as before",
/// not "zero". An absolute header (`relative == false`) always has every
/// field set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub channel_id: u32,
    pub relative: bool,
    pub timestamp: Option<u32>,
    pub datatype: Option<u8>,
    pub body_length: Option<u32>,
    pub stream_id: Option<u32>,
}

impl Header {
    /// An absolute header with every field populated.
    pub fn absolute(
        channel_id: u32,
        timestamp: u32,
        datatype: u8,
        body_length: u32,
        stream_id: u32,
    ) -> Self {
        Header {
            channel_id,
            relative: false,
            timestamp: Some(timestamp),
            datatype: Some(datatype),
            body_length: Some(body_length),
            stream_id: Some(stream_id),
        }
    }

    /// A bare continuation header: channel id only, nothing changed.
    pub fn continuation(channel_id: u32) -> Self {
        Header {
            channel_id,
            relative: true,
            timestamp: None,
            datatype: None,
            body_length: None,
            stream_id: None,
        }
    }
}
