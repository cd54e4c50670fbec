// ABOUTME: Minimal WebSocket frame codec for the raw-socket fallback transport
// ABOUTME: Masked single-frame client encoding, incremental server-frame decoding

pub const OPCODE_CONTINUATION: u8 = 0x0;
pub const OPCODE_TEXT: u8 = 0x1;
pub const OPCODE_CLOSE: u8 = 0x8;
pub const OPCODE_PING: u8 = 0x9;

#[derive(Debug)]
pub struct Frame {
    pub fin: bool,
    pub opcode: u8,
    pub payload: Vec<u8>,
}

/// Encodes a single masked client-to-server text frame. Payload length
/// goes in 1, 2, or 8 bytes per the standard length-prefix rules.
pub fn encode_text(payload: &[u8], mask: [u8; 4]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 14);
    out.push(0x80 | OPCODE_TEXT); // FIN set, no fragmentation

    let len = payload.len();
    if len < 126 {
        out.push(0x80 | len as u8);
    } else if len <= u16::MAX as usize {
        out.push(0x80 | 126);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(0x80 | 127);
        out.extend_from_slice(&(len as u64).to_be_bytes());
    }

    out.extend_from_slice(&mask);
    out.extend(payload.iter().enumerate().map(|(i, b)| b ^ mask[i % 4]));
    out
}

/// Decodes one frame from the front of `buf`. Returns the frame and the
/// number of bytes consumed, or None when more data is needed. Server
/// frames are normally unmasked, but a mask is honored if present.
pub fn decode(buf: &[u8]) -> Option<(Frame, usize)> {
    if buf.len() < 2 {
        return None;
    }

    let fin = buf[0] & 0x80 != 0;
    let opcode = buf[0] & 0x0F;
    let masked = buf[1] & 0x80 != 0;

    let (mut len, mut offset) = ((buf[1] & 0x7F) as usize, 2);
    if len == 126 {
        if buf.len() < 4 {
            return None;
        }
        len = u16::from_be_bytes([buf[2], buf[3]]) as usize;
        offset = 4;
    } else if len == 127 {
        if buf.len() < 10 {
            return None;
        }
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&buf[2..10]);
        len = u64::from_be_bytes(bytes) as usize;
        offset = 10;
    }

    let mask = if masked {
        if buf.len() < offset + 4 {
            return None;
        }
        let key = [buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]];
        offset += 4;
        Some(key)
    } else {
        None
    };

    // A hostile length prefix must not overflow the bounds check
    let end = offset.checked_add(len)?;
    if buf.len() < end {
        return None;
    }

    let mut payload = buf[offset..end].to_vec();
    if let Some(key) = mask {
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= key[i % 4];
        }
    }

    Some((Frame { fin, opcode, payload }, offset + len))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(payload: &[u8]) -> Frame {
        let encoded = encode_text(payload, [0x1a, 0x2b, 0x3c, 0x4d]);
        let (frame, consumed) = decode(&encoded).expect("complete frame");
        assert_eq!(consumed, encoded.len());
        frame
    }

    #[test]
    fn test_roundtrip_short_payload() {
        let frame = roundtrip(b"{\"id\":1}");
        assert!(frame.fin);
        assert_eq!(frame.opcode, OPCODE_TEXT);
        assert_eq!(frame.payload, b"{\"id\":1}");
    }

    #[test]
    fn test_roundtrip_130_bytes_uses_two_byte_length() {
        let payload = vec![b'x'; 130];
        let encoded = encode_text(&payload, [9, 9, 9, 9]);
        // 126 marker means the real length follows in two bytes
        assert_eq!(encoded[1] & 0x7F, 126);
        assert_eq!(u16::from_be_bytes([encoded[2], encoded[3]]), 130);

        let (frame, _) = decode(&encoded).unwrap();
        assert_eq!(frame.payload, payload);
    }

    #[test]
    fn test_roundtrip_large_payload_uses_eight_byte_length() {
        let payload = vec![b'y'; 70_000];
        let encoded = encode_text(&payload, [1, 2, 3, 4]);
        assert_eq!(encoded[1] & 0x7F, 127);

        let (frame, consumed) = decode(&encoded).unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(frame.payload.len(), 70_000);
    }

    #[test]
    fn test_decode_unmasked_server_frame() {
        // Hand-built unmasked text frame: "hi"
        let raw = [0x81, 0x02, b'h', b'i'];
        let (frame, consumed) = decode(&raw).unwrap();
        assert_eq!(consumed, 4);
        assert_eq!(frame.payload, b"hi");
    }

    #[test]
    fn test_decode_incomplete_returns_none() {
        let encoded = encode_text(b"hello world", [5, 6, 7, 8]);
        assert!(decode(&encoded[..1]).is_none());
        assert!(decode(&encoded[..encoded.len() - 1]).is_none());
    }

    #[test]
    fn test_decode_absurd_length_prefix_does_not_panic() {
        // 8-byte length path with a near-u64::MAX payload length
        let mut raw = vec![0x81, 0x7F];
        raw.extend_from_slice(&u64::MAX.to_be_bytes());
        raw.extend_from_slice(&[0u8; 32]);
        assert!(decode(&raw).is_none());
    }

    #[test]
    fn test_decode_leaves_trailing_bytes() {
        let mut buf = encode_text(b"one", [0, 0, 0, 0]);
        let first_len = buf.len();
        buf.extend_from_slice(&encode_text(b"two", [0, 0, 0, 0]));

        let (frame, consumed) = decode(&buf).unwrap();
        assert_eq!(frame.payload, b"one");
        assert_eq!(consumed, first_len);

        let (frame2, _) = decode(&buf[consumed..]).unwrap();
        assert_eq!(frame2.payload, b"two");
    }
}
