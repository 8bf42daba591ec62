// Message codec (C4): typed events carried inside a reassembled message body,
// selected by the chunk header's `datatype` tag. Encoding is synchronous and
// total; decoding of `Notify`/`Invoke` walks an AMF0 value stream and is
// exposed as `async fn` per the suspension model in SPEC_FULL.md §9 -- by the
// time a message reaches this codec its body is already fully buffered by the
// channel demuxer, so nothing here actually awaits, but the signature keeps
// this module honest about where the model places a suspension point.

use byteorder::{BigEndian, ByteOrder};

use crate::amf::{AMFDecodingCursor, AMF0Value};
use crate::constants::*;
use crate::error::{CodecError, EncodeError};

/// One fully-decoded RTMP message, independent of how many chunks it took to
/// arrive on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedEvent {
    /// Peer has changed the outbound chunk size.
    FrameSize(u32),
    /// Acknowledges bytes received so far.
    BytesRead(u32),
    /// Ping / stream-control family. `v2`/`v3` default to -1 when the wire
    /// form for this `event_type` doesn't carry them.
    ControlMessage {
        event_type: u16,
        v1: u32,
        v2: i32,
        v3: i32,
    },
    DownstreamBandwidth(u32),
    UpstreamBandwidth {
        bandwidth: u32,
        limit_type: u8,
    },
    /// Unacknowledged RPC.
    Notify {
        name: String,
        id: f64,
        argv: Vec<AMF0Value>,
    },
    /// RPC with a response expected when `id != 0`.
    Invoke {
        name: String,
        id: f64,
        argv: Vec<AMF0Value>,
    },
    AudioData(Vec<u8>),
    VideoData(Vec<u8>),
}

impl TypedEvent {
    /// The `datatype` tag this event is carried under on the wire.
    pub fn datatype(&self) -> u8 {
        match self {
            TypedEvent::FrameSize(_) => TYPE_FRAME_SIZE,
            TypedEvent::BytesRead(_) => TYPE_BYTES_READ,
            TypedEvent::ControlMessage { .. } => TYPE_CONTROL_MESSAGE,
            TypedEvent::DownstreamBandwidth(_) => TYPE_DOWNSTREAM_BANDWIDTH,
            TypedEvent::UpstreamBandwidth { .. } => TYPE_UPSTREAM_BANDWIDTH,
            TypedEvent::Notify { .. } => TYPE_NOTIFY,
            TypedEvent::Invoke { .. } => TYPE_INVOKE,
            TypedEvent::AudioData(_) => TYPE_AUDIO_DATA,
            TypedEvent::VideoData(_) => TYPE_VIDEO_DATA,
        }
    }
}

fn write_u32_be(out: &mut Vec<u8>, value: u32) {
    let mut b = [0u8; 4];
    BigEndian::write_u32(&mut b, value);
    out.extend_from_slice(&b);
}

fn write_i32_be(out: &mut Vec<u8>, value: i32) {
    write_u32_be(out, value as u32);
}

/// Encodes an event to its wire payload. Never fails for the fixed-size
/// control/bandwidth/streamable variants; `Notify`/`Invoke` can fail if an
/// argument is not representable (see `AMF0Value::encode`).
pub fn encode_event(event: &TypedEvent) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::new();
    match event {
        TypedEvent::FrameSize(size) => write_u32_be(&mut out, *size),
        TypedEvent::BytesRead(bytes) => write_u32_be(&mut out, *bytes),
        TypedEvent::ControlMessage {
            event_type,
            v1,
            v2,
            v3,
        } => {
            out.extend_from_slice(&event_type.to_be_bytes());
            write_u32_be(&mut out, *v1);
            write_i32_be(&mut out, *v2);
            write_i32_be(&mut out, *v3);
        }
        TypedEvent::DownstreamBandwidth(bw) => write_u32_be(&mut out, *bw),
        TypedEvent::UpstreamBandwidth {
            bandwidth,
            limit_type,
        } => {
            write_u32_be(&mut out, *bandwidth);
            out.push(*limit_type);
        }
        TypedEvent::Notify { name, id, argv } | TypedEvent::Invoke { name, id, argv } => {
            out.extend(AMF0Value::String { value: name.clone() }.encode()?);
            out.extend(AMF0Value::Number { value: *id }.encode()?);
            for arg in argv {
                out.extend(arg.encode()?);
            }
        }
        TypedEvent::AudioData(bytes) => out.extend_from_slice(bytes),
        TypedEvent::VideoData(bytes) => out.extend_from_slice(bytes),
    }
    Ok(out)
}

/// Decodes a message body into its typed event, given the chunk header's
/// `datatype`. Trailing bytes after a bounded-size event is a protocol error;
/// `AudioData`/`VideoData` are opaque and consume the whole payload.
pub async fn decode_event(datatype: u8, payload: &[u8]) -> Result<TypedEvent, CodecError> {
    match datatype {
        TYPE_FRAME_SIZE => {
            expect_len(payload, 4)?;
            Ok(TypedEvent::FrameSize(BigEndian::read_u32(payload)))
        }
        TYPE_BYTES_READ => {
            expect_len(payload, 4)?;
            Ok(TypedEvent::BytesRead(BigEndian::read_u32(payload)))
        }
        TYPE_CONTROL_MESSAGE => decode_control_message(payload),
        TYPE_DOWNSTREAM_BANDWIDTH => {
            expect_len(payload, 4)?;
            Ok(TypedEvent::DownstreamBandwidth(BigEndian::read_u32(payload)))
        }
        TYPE_UPSTREAM_BANDWIDTH => {
            expect_len(payload, 5)?;
            Ok(TypedEvent::UpstreamBandwidth {
                bandwidth: BigEndian::read_u32(payload),
                limit_type: payload[4],
            })
        }
        TYPE_AUDIO_DATA => Ok(TypedEvent::AudioData(payload.to_vec())),
        TYPE_VIDEO_DATA => Ok(TypedEvent::VideoData(payload.to_vec())),
        TYPE_NOTIFY => {
            let (name, id, argv) = decode_invocation_body(payload).await?;
            Ok(TypedEvent::Notify { name, id, argv })
        }
        TYPE_INVOKE => {
            let (name, id, argv) = decode_invocation_body(payload).await?;
            Ok(TypedEvent::Invoke { name, id, argv })
        }
        other => Err(CodecError::UnknownEventType(other)),
    }
}

fn expect_len(payload: &[u8], expected: usize) -> Result<(), CodecError> {
    if payload.len() < expected {
        return Err(CodecError::Decode(format!(
            "truncated event payload: expected at least {expected} bytes, found {}",
            payload.len()
        )));
    }
    if payload.len() > expected {
        return Err(CodecError::TrailingData {
            expected,
            actual: payload.len(),
        });
    }
    Ok(())
}

fn decode_control_message(payload: &[u8]) -> Result<TypedEvent, CodecError> {
    if payload.len() < 6 {
        return Err(CodecError::Decode(format!(
            "truncated control message: expected at least 6 bytes, found {}",
            payload.len()
        )));
    }
    let event_type = BigEndian::read_u16(&payload[0..2]);
    let v1 = BigEndian::read_u32(&payload[2..6]);
    let v2 = if payload.len() >= 10 {
        BigEndian::read_i32(&payload[6..10])
    } else {
        -1
    };
    let v3 = if payload.len() >= 14 {
        BigEndian::read_i32(&payload[10..14])
    } else {
        -1
    };
    let consumed = if payload.len() >= 14 {
        14
    } else if payload.len() >= 10 {
        10
    } else {
        6
    };
    if payload.len() > consumed {
        return Err(CodecError::TrailingData {
            expected: consumed,
            actual: payload.len(),
        });
    }
    Ok(TypedEvent::ControlMessage {
        event_type,
        v1,
        v2,
        v3,
    })
}

/// Shared `Notify`/`Invoke` body: an AMF0 string name, an AMF0 number id, then
/// zero or more AMF0 values making up `argv`, read until the payload ends.
async fn decode_invocation_body(payload: &[u8]) -> Result<(String, f64, Vec<AMF0Value>), CodecError> {
    let mut cursor = AMFDecodingCursor::new(payload.len());

    let name_value = AMF0Value::decode(&mut cursor, payload)?;
    let name = name_value.get_string().to_string();

    let id_value = AMF0Value::decode(&mut cursor, payload)?;
    let id = id_value.get_float();

    let mut argv = Vec::new();
    while !cursor.ended() {
        argv.push(AMF0Value::decode(&mut cursor, payload)?);
    }

    Ok((name, id, argv))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_on<F: std::future::Future>(fut: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(fut)
    }

    #[test]
    fn frame_size_roundtrip() {
        let event = TypedEvent::FrameSize(4096);
        let payload = encode_event(&event).unwrap();
        let decoded = block_on(decode_event(TYPE_FRAME_SIZE, &payload)).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn control_message_without_optional_fields_defaults_to_minus_one() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&0u16.to_be_bytes());
        write_u32_be(&mut payload, 7);
        let decoded = block_on(decode_event(TYPE_CONTROL_MESSAGE, &payload)).unwrap();
        assert_eq!(
            decoded,
            TypedEvent::ControlMessage {
                event_type: 0,
                v1: 7,
                v2: -1,
                v3: -1,
            }
        );
    }

    #[test]
    fn control_message_roundtrip_full() {
        let event = TypedEvent::ControlMessage {
            event_type: 3,
            v1: 1,
            v2: 2,
            v3: 3,
        };
        let payload = encode_event(&event).unwrap();
        let decoded = block_on(decode_event(TYPE_CONTROL_MESSAGE, &payload)).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn upstream_bandwidth_roundtrip() {
        let event = TypedEvent::UpstreamBandwidth {
            bandwidth: 2500000,
            limit_type: 2,
        };
        let payload = encode_event(&event).unwrap();
        let decoded = block_on(decode_event(TYPE_UPSTREAM_BANDWIDTH, &payload)).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn invoke_roundtrip_with_non_ascii_name() {
        let event = TypedEvent::Invoke {
            name: "дак".to_string(),
            id: 2.0,
            argv: vec![AMF0Value::Null],
        };
        let payload = encode_event(&event).unwrap();
        let decoded = block_on(decode_event(TYPE_INVOKE, &payload)).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn notify_with_empty_argv() {
        let event = TypedEvent::Notify {
            name: "onStatus".to_string(),
            id: 0.0,
            argv: vec![],
        };
        let payload = encode_event(&event).unwrap();
        let decoded = block_on(decode_event(TYPE_NOTIFY, &payload)).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn audio_video_are_opaque() {
        let audio = TypedEvent::AudioData(vec![1, 2, 3]);
        let payload = encode_event(&audio).unwrap();
        assert_eq!(payload, vec![1, 2, 3]);
        let decoded = block_on(decode_event(TYPE_AUDIO_DATA, &payload)).unwrap();
        assert_eq!(decoded, audio);
    }

    #[test]
    fn unknown_type_tag_rejected() {
        let err = block_on(decode_event(200, &[])).unwrap_err();
        assert!(matches!(err, CodecError::UnknownEventType(200)));
    }

    #[test]
    fn trailing_data_rejected() {
        let mut payload = Vec::new();
        write_u32_be(&mut payload, 4096);
        payload.push(0xFF);
        let err = block_on(decode_event(TYPE_FRAME_SIZE, &payload)).unwrap_err();
        assert!(matches!(err, CodecError::TrailingData { .. }));
    }
}
