use bytes::{Buf, BufMut, BytesMut};

use super::{get_varint, put_varint, skip_field, MAX_FRAME_SIZE};
use crate::error::{ConnectError, ConnectResult};

const WIRE_TYPE_VARINT: u8 = 0;
const WIRE_TYPE_LEN: u8 = 2;

fn tag(field_number: u32, wire_type: u8) -> u8 {
    ((field_number << 3) | wire_type as u32) as u8
}

fn put_len_delimited(buf: &mut BytesMut, field_number: u32, value: &str) {
    if value.is_empty() {
        return;
    }
    buf.put_u8(tag(field_number, WIRE_TYPE_LEN));
    put_varint(buf, value.len() as u64);
    buf.put_slice(value.as_bytes());
}

fn put_varint_field(buf: &mut BytesMut, field_number: u32, value: u64) {
    buf.put_u8(tag(field_number, WIRE_TYPE_VARINT));
    put_varint(buf, value);
}

/// Declared authentication mode of an [`ExchangeRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthType {
    #[default]
    Unspecified = 0,
    DbNative = 1,
    Iam = 2,
}

impl AuthType {
    fn from_wire(value: u64) -> Self {
        match value {
            1 => AuthType::DbNative,
            2 => AuthType::Iam,
            _ => AuthType::Unspecified,
        }
    }
}

/// Server's disposition of an [`ExchangeRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseCode {
    #[default]
    Unspecified = 0,
    Ok = 1,
    Error = 2,
}

impl ResponseCode {
    fn from_wire(value: u64) -> Self {
        match value {
            1 => ResponseCode::Ok,
            2 => ResponseCode::Error,
            _ => ResponseCode::Unspecified,
        }
    }
}

/// The client->server metadata-exchange message (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExchangeRequest {
    pub user_agent: String,
    pub auth_type: AuthType,
    pub oauth2_token: String,
}

impl ExchangeRequest {
    /// Encode the protobuf body (without the 4-byte frame prefix).
    ///
    /// `user_agent` and `oauth2_token` are omitted entirely when empty;
    /// `auth_type` is always written, even when `Unspecified`, since one of
    /// `DbNative`/`Iam` is always chosen by the connector before this is
    /// called.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        put_len_delimited(&mut buf, 1, &self.user_agent);
        put_varint_field(&mut buf, 2, self.auth_type as u64);
        put_len_delimited(&mut buf, 3, &self.oauth2_token);
        buf
    }

    /// Decode a body (without the frame prefix). Same field-dispatch shape
    /// as [`ExchangeResponse::decode`]: unknown fields with a skippable
    /// wire type are ignored, duplicate known fields let the last value
    /// win, and a missing `auth_type` defaults to `Unspecified`. The live
    /// connector never decodes its own request; this exists to make
    /// `decode(encode(r)) == r` round-trip testable (spec §8 invariant 1).
    pub fn decode(buf: &mut BytesMut) -> ConnectResult<Self> {
        let mut user_agent = String::new();
        let mut auth_type = AuthType::Unspecified;
        let mut oauth2_token = String::new();

        while buf.has_remaining() {
            let tag_byte = buf.get_u8();
            let field_number = (tag_byte >> 3) as u32;
            let wire_type = tag_byte & 0x07;

            match (field_number, wire_type) {
                (1, WIRE_TYPE_LEN) => {
                    user_agent = read_len_delimited_string(buf, "user_agent")?;
                }
                (2, WIRE_TYPE_VARINT) => {
                    auth_type = AuthType::from_wire(get_varint(buf)?);
                }
                (3, WIRE_TYPE_LEN) => {
                    oauth2_token = read_len_delimited_string(buf, "oauth2_token")?;
                }
                (_, wt) => skip_field(buf, wt)?,
            }
        }

        Ok(ExchangeRequest {
            user_agent,
            auth_type,
            oauth2_token,
        })
    }
}

fn read_len_delimited_string(buf: &mut BytesMut, field: &str) -> ConnectResult<String> {
    let len = get_varint(buf)? as usize;
    if buf.remaining() < len {
        return Err(ConnectError::MetadataExchangeProtocolError(format!(
            "truncated {field} field"
        )));
    }
    let bytes = buf.split_to(len);
    String::from_utf8(bytes.to_vec()).map_err(|_| {
        ConnectError::MetadataExchangeProtocolError(format!("{field} field was not valid utf-8"))
    })
}

/// The server->client metadata-exchange message (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExchangeResponse {
    pub response_code: ResponseCode,
    pub error: String,
}

impl ExchangeResponse {
    /// Encode the protobuf body. Exposed mainly for tests exercising the
    /// round-trip invariant (spec §8 invariant 2); the live connector only
    /// ever decodes responses.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        put_varint_field(&mut buf, 1, self.response_code as u64);
        put_len_delimited(&mut buf, 2, &self.error);
        buf
    }

    /// Decode a body (without the frame prefix). Walks fields until the
    /// buffer is exhausted; unknown fields with a skippable wire type are
    /// ignored, duplicate known fields let the last value win, and a
    /// missing `response_code` defaults to `Unspecified`.
    pub fn decode(buf: &mut BytesMut) -> ConnectResult<Self> {
        let mut response_code = ResponseCode::Unspecified;
        let mut error = String::new();

        while buf.has_remaining() {
            let tag_byte = buf.get_u8();
            let field_number = (tag_byte >> 3) as u32;
            let wire_type = tag_byte & 0x07;

            match (field_number, wire_type) {
                (1, WIRE_TYPE_VARINT) => {
                    response_code = ResponseCode::from_wire(get_varint(buf)?);
                }
                (2, WIRE_TYPE_LEN) => {
                    error = read_len_delimited_string(buf, "error")?;
                }
                (_, wt) => skip_field(buf, wt)?,
            }
        }

        Ok(ExchangeResponse {
            response_code,
            error,
        })
    }
}

/// Read the 4-byte big-endian length prefix, enforce the 10 MiB cap, and
/// return the expected body length without consuming the body itself.
pub fn decode_frame_len(prefix: [u8; 4]) -> ConnectResult<u32> {
    let len = u32::from_be_bytes(prefix);
    if len > MAX_FRAME_SIZE {
        return Err(ConnectError::MetadataExchangeProtocolError(format!(
            "frame of {len} bytes exceeds the {MAX_FRAME_SIZE} byte cap"
        )));
    }
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::frame;

    fn full_request() -> ExchangeRequest {
        ExchangeRequest {
            user_agent: "ua".into(),
            auth_type: AuthType::Iam,
            oauth2_token: "t".into(),
        }
    }

    #[test]
    fn request_byte_exact() {
        // S6: user_agent="ua", auth_type=IAM, oauth2_token="t"
        let encoded = full_request().encode();
        assert_eq!(
            encoded.as_ref(),
            &[0x0A, 0x02, 0x75, 0x61, 0x10, 0x02, 0x1A, 0x01, 0x74][..]
        );

        let framed = frame(&encoded);
        assert_eq!(framed.as_ref(), &[0x00, 0x00, 0x00, 0x09, 0x0A, 0x02, 0x75, 0x61, 0x10, 0x02, 0x1A, 0x01, 0x74][..]);
    }

    #[test]
    fn request_roundtrip() {
        for req in [
            full_request(),
            ExchangeRequest {
                user_agent: String::new(),
                auth_type: AuthType::DbNative,
                oauth2_token: String::new(),
            },
        ] {
            let mut encoded = req.encode();
            let decoded = ExchangeRequest::decode(&mut encoded).unwrap();
            assert_eq!(decoded, req);
        }
    }

    #[test]
    fn request_omits_empty_strings() {
        let req = ExchangeRequest {
            user_agent: String::new(),
            auth_type: AuthType::DbNative,
            oauth2_token: String::new(),
        };
        let encoded = req.encode();
        // only the auth_type varint field remains
        assert_eq!(encoded.as_ref(), &[0x10, 0x01][..]);
    }

    #[test]
    fn response_roundtrip() {
        for resp in [
            ExchangeResponse {
                response_code: ResponseCode::Ok,
                error: String::new(),
            },
            ExchangeResponse {
                response_code: ResponseCode::Error,
                error: "permission denied".into(),
            },
        ] {
            let mut encoded = resp.encode();
            let decoded = ExchangeResponse::decode(&mut encoded).unwrap();
            assert_eq!(decoded, resp);
        }
    }

    #[test]
    fn response_decode_skips_unknown_fields() {
        let resp = ExchangeResponse {
            response_code: ResponseCode::Ok,
            error: String::new(),
        };
        let mut encoded = resp.encode();
        // append an unknown varint field (field 9, wire type 0) the decoder
        // must skip without error. `| 0` spells out the wire type rather
        // than leaving it implicit.
        #[allow(clippy::identity_op)]
        encoded.put_u8((9 << 3) | 0);
        put_varint(&mut encoded, 12345);

        let decoded = ExchangeResponse::decode(&mut encoded).unwrap();
        assert_eq!(decoded, resp);
    }

    #[test]
    fn response_missing_code_defaults_unspecified() {
        let mut empty = BytesMut::new();
        let decoded = ExchangeResponse::decode(&mut empty).unwrap();
        assert_eq!(decoded.response_code, ResponseCode::Unspecified);
    }

    #[test]
    fn frame_len_rejects_oversize() {
        // S4: server sends uint32_be(20_000_001)
        let prefix = 20_000_001u32.to_be_bytes();
        assert!(decode_frame_len(prefix).is_err());
    }
}
