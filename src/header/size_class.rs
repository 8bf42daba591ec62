// The basic header byte: two bits selecting the chunk message header size
// class, six bits of channel id (extended to 1 or 2 bytes by the frame
// codec for channel ids that don't fit).
//
// Byte-exact against the reference decoder's fixtures: decodeHeaderByte(0)
// == (12, 0), decodeHeaderByte(192) == (1, 0), decodeHeaderByte(255) == (1, 63).

use crate::error::{CodecError, EncodeError};
use crate::header::Header;

/// Maps a chunk message header byte length to the two-bit wire value.
fn top_bits_for_size_bytes(size_bytes: u8) -> Result<u8, EncodeError> {
    match size_bytes {
        12 => Ok(0),
        8 => Ok(1),
        4 => Ok(2),
        1 => Ok(3),
        _ => Err(EncodeError::WrongType {
            field: "size_bytes",
            reason: format!("{size_bytes} is not one of 1, 4, 8, 12"),
        }),
    }
}

/// Inverse of `top_bits_for_size_bytes`.
fn size_bytes_for_top_bits(top_bits: u8) -> u8 {
    match top_bits {
        0 => 12,
        1 => 8,
        2 => 4,
        _ => 1,
    }
}

/// Packs a chunk message header size (1, 4, 8 or 12 bytes) and the low six
/// bits of a channel id into one basic header byte.
pub fn encode_header_byte(size_bytes: u8, channel_id_low: u8) -> Result<u8, EncodeError> {
    if channel_id_low > 0x3F {
        return Err(EncodeError::WrongType {
            field: "channel_id_low",
            reason: format!("{channel_id_low} does not fit in six bits"),
        });
    }
    let top = top_bits_for_size_bytes(size_bytes)?;
    Ok((top << 6) | channel_id_low)
}

/// Unpacks a basic header byte into (chunk message header size in bytes, low
/// six bits of the channel id).
pub fn decode_header_byte(byte: u8) -> (u8, u8) {
    let top = byte >> 6;
    let channel_id_low = byte & 0x3F;
    (size_bytes_for_top_bits(top), channel_id_low)
}

/// Which of the four chunk message header size classes this header matches,
/// expressed as the wire index (0 = 12 bytes, 1 = 8, 2 = 4, 3 = 1).
///
/// A header's fields must follow one of exactly four cumulative patterns:
/// nothing, timestamp only, timestamp+datatype+bodyLength, or all four plus
/// streamId. Anything else (e.g. datatype set without bodyLength) is not a
/// header this codec can place on the wire.
pub fn get_header_size_index(header: &Header) -> Result<u8, CodecError> {
    let has_ts = header.timestamp.is_some();
    let has_dt = header.datatype.is_some();
    let has_len = header.body_length.is_some();
    let has_sid = header.stream_id.is_some();

    match (has_ts, has_dt, has_len, has_sid) {
        (false, false, false, false) => Ok(3),
        (true, false, false, false) => Ok(2),
        (true, true, true, false) => Ok(1),
        (true, true, true, true) => Ok(0),
        _ => Err(CodecError::Decode(format!(
            "header on channel {} has a field combination that matches no size class \
             (timestamp={has_ts}, datatype={has_dt}, bodyLength={has_len}, streamId={has_sid})",
            header.channel_id
        ))),
    }
}

/// The chunk message header size in bytes implied by `header`'s fields.
pub fn get_header_size(header: &Header) -> Result<u8, CodecError> {
    Ok(size_bytes_for_top_bits(get_header_size_index(header)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_header_byte_matches_reference_fixtures() {
        assert_eq!(decode_header_byte(0), (12, 0));
        assert_eq!(decode_header_byte(192), (1, 0));
        assert_eq!(decode_header_byte(255), (1, 63));
    }

    #[test]
    fn encode_header_byte_matches_reference_fixtures() {
        assert_eq!(encode_header_byte(12, 0).unwrap(), 0);
        assert_eq!(encode_header_byte(1, 0).unwrap(), 192);
        assert_eq!(encode_header_byte(1, 63).unwrap(), 255);
    }

    #[test]
    fn encode_header_byte_rejects_bad_size_class() {
        assert!(encode_header_byte(5, 0).is_err());
    }

    #[test]
    fn encode_header_byte_rejects_channel_overflow() {
        assert!(encode_header_byte(1, 0x40).is_err());
    }

    #[test]
    fn size_index_channel_only() {
        let h = Header::continuation(3);
        assert_eq!(get_header_size_index(&h).unwrap(), 3);
        assert_eq!(get_header_size(&h).unwrap(), 1);
    }

    #[test]
    fn size_index_timestamp_only() {
        let mut h = Header::continuation(3);
        h.timestamp = Some(23455);
        assert_eq!(get_header_size_index(&h).unwrap(), 2);
    }

    #[test]
    fn size_index_no_stream_id() {
        let mut h = Header::continuation(3);
        h.timestamp = Some(23455);
        h.datatype = Some(12);
        h.body_length = Some(1234);
        assert_eq!(get_header_size_index(&h).unwrap(), 1);
    }

    #[test]
    fn size_index_full() {
        let h = Header::absolute(3, 23455, 12, 1234, 9);
        assert_eq!(get_header_size_index(&h).unwrap(), 0);
    }

    #[test]
    fn size_index_rejects_partial_combination() {
        let mut h = Header::continuation(3);
        h.datatype = Some(12);
        h.body_length = Some(1234);
        assert!(get_header_size_index(&h).is_err());
    }
}
