//! RFC 6455 WebSocket handshake and frame codec, layered over the
//! blocking stream capability (typically a [`crate::stream::tls::TlsStream`]).
//!
//! Two behaviors differ from the source this was grounded on, per
//! documented redesign decisions: client-side frames are always masked
//! with a freshly generated key (the source computed `mask=true` but
//! never wrote a key, which violates RFC 6455 and would be rejected by a
//! conforming server), and both reading and writing support the extended
//! 16-bit and 64-bit length forms as well as fragmented messages.

use base64::Engine;
use sha1::{Digest, Sha1};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::stream::BlockingStream;

const GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

pub const OPCODE_CONTINUATION: u8 = 0x0;
pub const OPCODE_TEXT: u8 = 0x1;
pub const OPCODE_BINARY: u8 = 0x2;
pub const OPCODE_CLOSE: u8 = 0x8;
pub const OPCODE_PING: u8 = 0x9;
pub const OPCODE_PONG: u8 = 0xA;

/// A complete, reassembled WebSocket message.
#[derive(Debug, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
    Close,
}

/// Build the client handshake request and the key it embeds; the caller
/// must retain the key to validate the server's response.
pub fn generate_handshake(host: &str, uri: &str) -> (String, String) {
    let mut key_bytes = [0u8; 16];
    rand::Rng::fill(&mut rand::thread_rng(), &mut key_bytes);
    let key = base64::engine::general_purpose::STANDARD.encode(key_bytes);

    let request = format!(
        "GET {uri} HTTP/1.1\r\n\
         Host: {host}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: 13\r\n\r\n"
    );
    (request, key)
}

/// Validate a raw HTTP response against the handshake contract: status
/// line aside, headers must include a case-insensitive `Connection:
/// upgrade`, `Upgrade: websocket`, and `Sec-WebSocket-Accept` matching the
/// value derived from `key`.
pub fn validate_handshake_response(data: &[u8], key: &str) -> bool {
    let text = match std::str::from_utf8(data) {
        Ok(t) => t,
        Err(_) => return false,
    };

    let mut headers = HashMap::new();
    for line in text.split("\r\n").skip(1) {
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    let has_upgrade = headers
        .get("connection")
        .map(|v| v.to_ascii_lowercase().contains("upgrade"))
        .unwrap_or(false);
    let is_websocket = headers
        .get("upgrade")
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);
    let accept = match headers.get("sec-websocket-accept") {
        Some(v) => v,
        None => return false,
    };

    has_upgrade && is_websocket && *accept == expected_accept(key)
}

fn expected_accept(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

struct FrameHeader {
    fin: bool,
    opcode: u8,
    masked: bool,
    payload_len: u64,
}

fn read_frame_header<S: BlockingStream>(stream: &mut S) -> Result<FrameHeader> {
    let mut head = [0u8; 2];
    stream.read(&mut head)?;

    let fin = head[0] & 0x80 != 0;
    let opcode = head[0] & 0x0F;
    let masked = head[1] & 0x80 != 0;
    let len7 = head[1] & 0x7F;

    let payload_len = match len7 {
        126 => {
            let mut ext = [0u8; 2];
            stream.read(&mut ext)?;
            u16::from_be_bytes(ext) as u64
        }
        127 => {
            let mut ext = [0u8; 8];
            stream.read(&mut ext)?;
            u64::from_be_bytes(ext)
        }
        n => n as u64,
    };

    Ok(FrameHeader {
        fin,
        opcode,
        masked,
        payload_len,
    })
}

fn read_frame_payload<S: BlockingStream>(stream: &mut S, header: &FrameHeader) -> Result<Vec<u8>> {
    let mask_key = if header.masked {
        let mut key = [0u8; 4];
        stream.read(&mut key)?;
        Some(key)
    } else {
        None
    };

    let len = usize::try_from(header.payload_len)
        .map_err(|_| Error::Protocol("frame payload length overflows usize".to_string()))?;
    let mut payload = vec![0u8; len];
    if len > 0 {
        stream.read(&mut payload)?;
    }

    if let Some(key) = mask_key {
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= key[i % 4];
        }
    }

    Ok(payload)
}

/// Read one complete message, transparently reassembling fragmented
/// frames and answering control frames inline: `Ping` is answered with a
/// `Pong` echoing the same payload and reading continues; `Close` returns
/// [`Message::Close`] without responding (the caller is expected to tear
/// the connection down).
pub fn read_message<S: BlockingStream>(stream: &mut S) -> Result<Message> {
    let mut assembled = Vec::new();
    let mut message_opcode: Option<u8> = None;

    loop {
        let header = read_frame_header(stream)?;
        let payload = read_frame_payload(stream, &header)?;

        match header.opcode {
            OPCODE_CLOSE => return Ok(Message::Close),
            OPCODE_PING => {
                write_frame(stream, OPCODE_PONG, &payload, true)?;
                continue;
            }
            OPCODE_PONG => continue,
            OPCODE_CONTINUATION => {
                assembled.extend_from_slice(&payload);
            }
            opcode => {
                message_opcode = Some(opcode);
                assembled.extend_from_slice(&payload);
            }
        }

        if header.fin {
            let opcode = message_opcode.ok_or_else(|| {
                Error::Protocol("fin frame with no preceding data frame opcode".to_string())
            })?;
            return match opcode {
                OPCODE_TEXT => String::from_utf8(assembled)
                    .map(Message::Text)
                    .map_err(|_| Error::Protocol("text frame payload is not valid utf-8".to_string())),
                OPCODE_BINARY => Ok(Message::Binary(assembled)),
                other => Err(Error::Protocol(format!("unexpected data opcode {other}"))),
            };
        }
    }
}

/// Emit a single, unfragmented frame. `mask` must be `true` for
/// client-to-server frames and `false` for server-to-client frames, per
/// RFC 6455; when `true`, a fresh random 32-bit key is generated and the
/// payload is XORed with it before being written.
pub fn write_frame<S: BlockingStream>(stream: &mut S, opcode: u8, payload: &[u8], mask: bool) -> Result<()> {
    let mut frame = Vec::with_capacity(payload.len() + 14);
    frame.push(0x80 | opcode); // fin=1, no extension flags

    let mask_bit = if mask { 0x80 } else { 0x00 };
    if payload.len() < 126 {
        frame.push(mask_bit | payload.len() as u8);
    } else if payload.len() <= u16::MAX as usize {
        frame.push(mask_bit | 126);
        frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    } else {
        frame.push(mask_bit | 127);
        frame.extend_from_slice(&(payload.len() as u64).to_be_bytes());
    }

    if mask {
        let key: [u8; 4] = rand::random();
        frame.extend_from_slice(&key);
        let masked_payload: Vec<u8> = payload
            .iter()
            .enumerate()
            .map(|(i, b)| b ^ key[i % 4])
            .collect();
        frame.extend_from_slice(&masked_payload);
    } else {
        frame.extend_from_slice(payload);
    }

    stream.write(&frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// An in-memory stream for testing the codec without real sockets.
    struct MemStream {
        inbound: VecDeque<u8>,
        outbound: Vec<u8>,
    }

    impl MemStream {
        fn with_inbound(bytes: Vec<u8>) -> Self {
            Self {
                inbound: bytes.into(),
                outbound: Vec::new(),
            }
        }
    }

    impl BlockingStream for MemStream {
        fn connect(&mut self, _host: &str, _port: u16) -> Result<()> {
            Ok(())
        }
        fn disconnect(&mut self) {}
        fn write(&mut self, buf: &[u8]) -> Result<()> {
            self.outbound.extend_from_slice(buf);
            Ok(())
        }
        fn read(&mut self, buf: &mut [u8]) -> Result<()> {
            for slot in buf.iter_mut() {
                *slot = self
                    .inbound
                    .pop_front()
                    .ok_or_else(|| Error::Io(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof")))?;
            }
            Ok(())
        }
        fn stream_in(&mut self, out: &mut Vec<u8>) -> Result<()> {
            out.extend(self.inbound.drain(..));
            Ok(())
        }
        fn set_options(&mut self, _opts: crate::config::StreamOptions) -> Result<()> {
            Ok(())
        }
        fn endpoint(&self) -> Option<String> {
            None
        }
    }

    #[test]
    fn unmasked_short_text_frame_round_trips() {
        let mut writer = MemStream::with_inbound(Vec::new());
        write_frame(&mut writer, OPCODE_TEXT, b"hi", false).unwrap();

        let mut reader = MemStream::with_inbound(writer.outbound);
        let msg = read_message(&mut reader).unwrap();
        assert_eq!(msg, Message::Text("hi".to_string()));
    }

    #[test]
    fn masked_client_frame_always_carries_a_mask_key() {
        let mut writer = MemStream::with_inbound(Vec::new());
        write_frame(&mut writer, OPCODE_TEXT, b"secret", true).unwrap();

        // byte 1's high bit must be set, and the payload must not appear
        // in the clear anywhere in the frame.
        assert_eq!(writer.outbound[1] & 0x80, 0x80);
        assert!(!writer
            .outbound
            .windows(6)
            .any(|w| w == b"secret"));
    }

    #[test]
    fn long_frame_uses_extended_length_and_decodes_back() {
        let payload = vec![0x42u8; 70_000];
        let mut writer = MemStream::with_inbound(Vec::new());
        write_frame(&mut writer, OPCODE_BINARY, &payload, false).unwrap();
        assert_eq!(writer.outbound[1] & 0x7F, 127);

        let mut reader = MemStream::with_inbound(writer.outbound);
        let msg = read_message(&mut reader).unwrap();
        assert_eq!(msg, Message::Binary(payload));
    }

    #[test]
    fn fragmented_message_is_reassembled() {
        let mut writer = MemStream::with_inbound(Vec::new());
        // Manually build a two-frame fragmented text message: "he" then "llo".
        writer.outbound.extend_from_slice(&[0x01, 0x02, b'h', b'e']); // fin=0, TEXT
        writer.outbound.extend_from_slice(&[0x80, 0x03, b'l', b'l', b'o']); // fin=1, CONTINUATION

        let mut reader = MemStream::with_inbound(writer.outbound);
        let msg = read_message(&mut reader).unwrap();
        assert_eq!(msg, Message::Text("hello".to_string()));
    }

    #[test]
    fn ping_is_answered_with_pong_and_read_continues() {
        let mut writer = MemStream::with_inbound(Vec::new());
        writer.outbound.extend_from_slice(&[0x89, 0x04, b'p', b'i', b'n', b'g']); // PING
        write_frame(&mut writer, OPCODE_TEXT, b"ok", false).unwrap();

        let mut reader = MemStream::with_inbound(writer.outbound);
        let msg = read_message(&mut reader).unwrap();
        assert_eq!(msg, Message::Text("ok".to_string()));
    }

    #[test]
    fn handshake_validation_checks_the_computed_accept_value() {
        let key = "dGhlIHNhbXBsZSBub25jZQ==";
        let expected = expected_accept(key);
        let response = format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {expected}\r\n\r\n"
        );
        assert!(validate_handshake_response(response.as_bytes(), key));
        assert!(!validate_handshake_response(response.as_bytes(), "wrong-key"));
    }
}
