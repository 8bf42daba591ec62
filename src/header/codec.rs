// Full chunk header codec: basic header (with channel id extension) plus
// the chunk message header fields for whichever of the four size classes
// applies, plus the extended timestamp suffix.
//
// `decode_header` is restartable: called again from byte zero on a buffer
// that has grown since the last `NeedMoreBytes`, it reproduces the same
// read sequence and succeeds once enough bytes have arrived. It holds no
// state of its own between calls -- that's the frame reader's job.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{CodecError, EncodeError};
use crate::header::size_class::{decode_header_byte, encode_header_byte, get_header_size};
use crate::header::Header;

const CHANNEL_EXT_1_THRESHOLD: u32 = 64;
const CHANNEL_EXT_2_THRESHOLD: u32 = 64 + 255;

fn need(buf_remaining: usize, required: usize) -> Result<(), CodecError> {
    if buf_remaining < required {
        Err(CodecError::NeedMoreBytes {
            needed: required - buf_remaining,
        })
    } else {
        Ok(())
    }
}

/// Encodes a basic header plus chunk message header plus, when the
/// timestamp (or delta) is at or past the 24-bit sentinel, the extended
/// timestamp suffix.
pub fn encode_header(header: &Header) -> Result<Vec<u8>, EncodeError> {
    let size_bytes = get_header_size(header).map_err(|e| EncodeError::WrongType {
        field: "header",
        reason: e.to_string(),
    })?;

    let mut out = Vec::with_capacity(size_bytes as usize + 4);
    encode_basic_header(&mut out, size_bytes, header.channel_id)?;

    let timestamp = header.timestamp.unwrap_or(0);
    let extended = timestamp >= crate::constants::EXTENDED_TIMESTAMP_MARKER;

    if size_bytes <= 4 {
        write_u24(&mut out, if extended { 0x00FF_FFFF } else { timestamp });
    }
    if size_bytes <= 8 {
        let body_length = header.body_length.ok_or(EncodeError::FieldNotSet {
            field: "body_length",
        })?;
        write_u24(&mut out, body_length);
        out.push(header.datatype.ok_or(EncodeError::FieldNotSet {
            field: "datatype",
        })?);
    }
    if size_bytes == 12 {
        let stream_id = header.stream_id.ok_or(EncodeError::FieldNotSet {
            field: "stream_id",
        })?;
        // Big-endian, not little-endian as §4.1/§6's prose claims: scenario
        // S2's concrete fixture (`streamId=45` -> `...00 00 00 2d`) and the
        // original decoder's `test_decodeSize12` both encode streamId
        // big-endian. Where the prose and the worked example disagree, the
        // example wins (DESIGN.md, Open Question decisions).
        let mut b = [0u8; 4];
        BigEndian::write_u32(&mut b, stream_id);
        out.extend_from_slice(&b);
    }
    if extended {
        let mut b = [0u8; 4];
        BigEndian::write_u32(&mut b, timestamp);
        out.extend_from_slice(&b);
    }

    Ok(out)
}

fn encode_basic_header(out: &mut Vec<u8>, size_bytes: u8, channel_id: u32) -> Result<(), EncodeError> {
    if channel_id >= CHANNEL_EXT_2_THRESHOLD {
        let ext = channel_id - CHANNEL_EXT_1_THRESHOLD;
        out.push(encode_header_byte(size_bytes, 1)?);
        out.push(ext as u8);
        out.push((ext >> 8) as u8);
    } else if channel_id >= CHANNEL_EXT_1_THRESHOLD {
        out.push(encode_header_byte(size_bytes, 0)?);
        out.push((channel_id - CHANNEL_EXT_1_THRESHOLD) as u8);
    } else {
        out.push(encode_header_byte(size_bytes, channel_id as u8)?);
    }
    Ok(())
}

fn write_u24(out: &mut Vec<u8>, value: u32) {
    let mut b = [0u8; 4];
    BigEndian::write_u32(&mut b, value);
    out.extend_from_slice(&b[1..]);
}

fn read_u24(buf: &[u8]) -> u32 {
    ((buf[0] as u32) << 16) | ((buf[1] as u32) << 8) | (buf[2] as u32)
}

/// Decodes one header from the front of `buf`, returning the header and the
/// number of bytes consumed (including any extended timestamp suffix, which
/// this function reads transparently whenever the 24-bit slot holds the
/// sentinel -- relative or absolute, per the Open Questions resolution in
/// SPEC_FULL.md §9). Returns `CodecError::NeedMoreBytes` if `buf` does not
/// yet hold a complete header; the caller should retry once more bytes have
/// arrived rather than treat this as a hard failure.
pub fn decode_header(buf: &[u8]) -> Result<(Header, usize), CodecError> {
    need(buf.len(), 1)?;
    let (size_bytes, channel_id_low) = decode_header_byte(buf[0]);

    let mut pos = 1usize;
    let channel_id = if channel_id_low == 1 {
        need(buf.len() - pos, 2)?;
        let ext = u16::from_le_bytes([buf[pos], buf[pos + 1]]);
        pos += 2;
        CHANNEL_EXT_1_THRESHOLD + ext as u32
    } else if channel_id_low == 0 {
        need(buf.len() - pos, 1)?;
        let ext = buf[pos];
        pos += 1;
        CHANNEL_EXT_1_THRESHOLD + ext as u32
    } else {
        channel_id_low as u32
    };

    if size_bytes == 1 {
        return Ok((Header::continuation(channel_id), pos));
    }

    need(buf.len() - pos, 3)?;
    let mut timestamp = read_u24(&buf[pos..]);
    pos += 3;
    let relative = size_bytes != 12;

    let (datatype, body_length) = if size_bytes >= 8 {
        need(buf.len() - pos, 4)?;
        let body_length = read_u24(&buf[pos..]);
        let datatype = buf[pos + 3];
        pos += 4;
        (Some(datatype), Some(body_length))
    } else {
        (None, None)
    };

    let stream_id = if size_bytes == 12 {
        need(buf.len() - pos, 4)?;
        // Big-endian; see the matching note in `encode_header`.
        let stream_id = BigEndian::read_u32(&buf[pos..pos + 4]);
        pos += 4;
        Some(stream_id)
    } else {
        None
    };

    if timestamp == crate::constants::EXTENDED_TIMESTAMP_MARKER {
        need(buf.len() - pos, 4)?;
        timestamp = BigEndian::read_u32(&buf[pos..pos + 4]);
        pos += 4;
    }

    Ok((
        Header {
            channel_id,
            relative,
            timestamp: Some(timestamp),
            datatype,
            body_length,
            stream_id,
        },
        pos,
    ))
}
