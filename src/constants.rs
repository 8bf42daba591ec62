// Wire-level constants for the chunk codec and message/event tag registry.
//
// Values here are bit-exact requirements of the protocol (see SPEC_FULL.md
// §4.1, §4.4) and of the published RTMP v3 spec; do not "clean up" the
// numbering without checking both.

/// Default chunk frame size, applied to every channel until `setFrameSize` changes it.
pub const DEFAULT_FRAME_SIZE: usize = 128;

/// Minimum/maximum accepted frame size, mirroring the teacher's chunk-size bounds.
pub const MIN_FRAME_SIZE: usize = 1;
pub const MAX_FRAME_SIZE: usize = 0x00FF_FFFF;

/// Reserved channel ids; user channels start at 2.
pub const CHANNEL_RESERVED_LOW: u32 = 0;
pub const CHANNEL_RESERVED_HIGH: u32 = 1;
pub const CHANNEL_MIN: u32 = 2;
/// Exclusive upper bound: the data model's range is `2..=65599` inclusive
/// (65599 = 64 + 65535, the largest value the two-byte channel extension can
/// carry), so this is one past the valid maximum, not the maximum itself.
pub const CHANNEL_MAX: u32 = 65600;

/// 24-bit timestamp sentinel: when the 24-bit slot holds this value, a
/// 32-bit big-endian extended timestamp follows the header (applies to both
/// absolute and relative headers, per the Open Questions resolution).
pub const EXTENDED_TIMESTAMP_MARKER: u32 = 0x00FF_FFFF;

/// Header size classes, expressed as total header length in bytes. The
/// two-bit `sizeClass` field of the header byte selects one of these: the
/// wire encoding of the class (0..3) is NOT the same as this byte count --
/// see `header::size_class` for the mapping.
pub const HEADER_SIZE_FULL: u8 = 12;
pub const HEADER_SIZE_NO_STREAM_ID: u8 = 8;
pub const HEADER_SIZE_TIMESTAMP_ONLY: u8 = 4;
pub const HEADER_SIZE_CONTINUATION: u8 = 1;

/// Default cap on a single message's reassembled body, guarding against a
/// peer claiming an unbounded `bodyLength` (see §5, Shared resources).
pub const DEFAULT_MAX_BODY_LENGTH: usize = 16 * 1024 * 1024;

/// Event type tags (`datatype`). Exact values are wire-level per SPEC_FULL.md §4.4.
pub const TYPE_FRAME_SIZE: u8 = 1;
pub const TYPE_BYTES_READ: u8 = 3;
pub const TYPE_CONTROL_MESSAGE: u8 = 4;
pub const TYPE_DOWNSTREAM_BANDWIDTH: u8 = 5;
pub const TYPE_UPSTREAM_BANDWIDTH: u8 = 6;
pub const TYPE_AUDIO_DATA: u8 = 7;
pub const TYPE_VIDEO_DATA: u8 = 8;
pub const TYPE_NOTIFY: u8 = 18;
pub const TYPE_INVOKE: u8 = 20;

/// Returns true for the two datatypes released frame-by-frame by the
/// demuxer instead of being buffered to a complete message (§4.3).
pub fn is_streamable_type(datatype: u8) -> bool {
    matches!(datatype, TYPE_AUDIO_DATA | TYPE_VIDEO_DATA)
}

/// Stream id of the control stream; owned by the session controller itself.
pub const CONTROL_STREAM_ID: u32 = 0;

/// Transaction id reserved to mean "no reply expected".
pub const NO_RESPONSE_TRANSACTION_ID: u32 = 0;

/// Conventional channel assignment for messages the session controller
/// sends on its own behalf (protocol control, RPC). The frame writer treats
/// channel ids purely as an allocation policy left to the caller (§4.5 pt.
/// 1); these are simply the session's own, fixed choice of caller.
pub const CHANNEL_PROTOCOL_CONTROL: u32 = 2;
pub const CHANNEL_INVOKE: u32 = 3;
pub const CHANNEL_AUDIO: u32 = 4;
pub const CHANNEL_VIDEO: u32 = 5;
pub const CHANNEL_DATA: u32 = 6;

/// The channel the session controller uses when it originates an event of
/// this `datatype`, mirroring the teacher's `RTMP_CHANNEL_*` convention.
pub fn channel_for_datatype(datatype: u8) -> u32 {
    match datatype {
        TYPE_AUDIO_DATA => CHANNEL_AUDIO,
        TYPE_VIDEO_DATA => CHANNEL_VIDEO,
        TYPE_NOTIFY => CHANNEL_DATA,
        TYPE_INVOKE => CHANNEL_INVOKE,
        _ => CHANNEL_PROTOCOL_CONTROL,
    }
}
