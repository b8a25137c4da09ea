//! Binary wire codec for the metadata exchange (spec §4.1).
//!
//! This is *not* a general protobuf runtime: it hand-rolls encode/decode for
//! exactly the two messages the metadata exchange uses, the same way the
//! teacher's own `messages` module hand-rolls the PostgreSQL wire format
//! rather than depending on a generic codec crate. Field layout follows the
//! standard tag-wire conventions (tag byte, varint, length-delimited) but no
//! other part of the protobuf spec (groups, packed repeated fields, maps) is
//! implemented, because nothing here needs it.

pub mod message;

pub use message::{decode_frame_len, AuthType, ExchangeRequest, ExchangeResponse, ResponseCode};

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{ConnectError, ConnectResult};

/// Maximum accepted frame size on decode (spec §4.1).
pub const MAX_FRAME_SIZE: u32 = 10 * 1024 * 1024;

const WIRE_TYPE_VARINT: u8 = 0;
const WIRE_TYPE_LEN: u8 = 2;
const WIRE_TYPE_I64: u8 = 1;
const WIRE_TYPE_I32: u8 = 5;

/// Write an unsigned varint: 7 bits per byte, MSB continuation.
pub(crate) fn put_varint(buf: &mut BytesMut, mut value: u64) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if value == 0 {
            break;
        }
    }
}

/// Read an unsigned varint, advancing the cursor. `MalformedFrame` if the
/// buffer is exhausted before a terminating byte is seen.
pub(crate) fn get_varint(buf: &mut BytesMut) -> ConnectResult<u64> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    loop {
        if !buf.has_remaining() {
            return Err(ConnectError::MetadataExchangeProtocolError(
                "truncated varint".into(),
            ));
        }
        let byte = buf.get_u8();
        value |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift >= 64 {
            return Err(ConnectError::MetadataExchangeProtocolError(
                "varint too long".into(),
            ));
        }
    }
}

/// Skip over a field's value once its wire type is known. Wire types 0 and 2
/// (varint, length-delimited) are genuinely variable-length; 1 and 5 are
/// fixed 8/4 byte widths that never appear in these two messages today but
/// must still be skippable without error (spec §4.1).
pub(crate) fn skip_field(buf: &mut BytesMut, wire_type: u8) -> ConnectResult<()> {
    match wire_type {
        WIRE_TYPE_VARINT => {
            get_varint(buf)?;
        }
        WIRE_TYPE_LEN => {
            let len = get_varint(buf)? as usize;
            if buf.remaining() < len {
                return Err(ConnectError::MetadataExchangeProtocolError(
                    "truncated length-delimited field".into(),
                ));
            }
            buf.advance(len);
        }
        WIRE_TYPE_I64 => {
            if buf.remaining() < 8 {
                return Err(ConnectError::MetadataExchangeProtocolError(
                    "truncated fixed64 field".into(),
                ));
            }
            buf.advance(8);
        }
        WIRE_TYPE_I32 => {
            if buf.remaining() < 4 {
                return Err(ConnectError::MetadataExchangeProtocolError(
                    "truncated fixed32 field".into(),
                ));
            }
            buf.advance(4);
        }
        other => {
            return Err(ConnectError::MetadataExchangeProtocolError(format!(
                "unsupported wire type {other}"
            )));
        }
    }
    Ok(())
}

/// Prepend the 4-byte big-endian frame length to an encoded message.
pub fn frame(body: &[u8]) -> BytesMut {
    let mut out = BytesMut::with_capacity(4 + body.len());
    out.put_u32(body.len() as u32);
    out.put_slice(body);
    out
}
