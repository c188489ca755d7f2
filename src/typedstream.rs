//! Best-effort text recovery from `attributedBody` blobs.
//!
//! Newer Messages databases leave `message.text` empty and store the body as an
//! `NSAttributedString` serialized in Apple's legacy typed-stream format. This module
//! does not deserialize the object graph. It scans for the string payloads, which are
//! introduced by `0x01 0x2b` (`+`, the C-string type tag) and followed by `0x86 0x84`
//! (end of object, next class reference), and reads them by their declared length.
//!
//! Layout of one string segment:
//!
//! ```text
//! 01 2b <len> <payload: len bytes> 86 84
//!
//! <len> = 0x00..=0x7f            one byte
//!       | 0x81 <u16 little-endian>
//!       | 0x82 <u32 little-endian>
//! ```
//!
//! Every function here is total: truncated or hostile input yields a shorter (possibly
//! empty) string, never a panic.

const SEGMENT_START: [u8; 2] = [0x01, 0x2b];
const SEGMENT_END: [u8; 2] = [0x86, 0x84];

const TAG_U16: u8 = 0x81;
const TAG_U32: u8 = 0x82;

/// Recover the plain text of an `attributedBody` blob.
///
/// All segments found are concatenated in the order they appear. Returns an empty
/// string when no segment can be read.
pub fn decode_attributed_body(bytes: &[u8]) -> String {
    let mut text = String::new();
    let mut cursor = 0;

    while let Some(start) = find(bytes, &SEGMENT_START, cursor) {
        let body = start + SEGMENT_START.len();
        match read_segment(bytes, body) {
            Some((payload, next)) => {
                text.push_str(&String::from_utf8_lossy(payload));
                cursor = next;
            }
            None => cursor = body,
        }
    }

    text
}

/// Read the segment whose header starts at `at`. Returns the payload and the offset
/// scanning should resume from.
fn read_segment(bytes: &[u8], at: usize) -> Option<(&[u8], usize)> {
    length_prefixed(bytes, at).or_else(|| delimited(bytes, at))
}

// The declared length is trusted when the payload fits and is followed by the
// closing marker. Without that trailer it is trusted only if no closing marker follows
// the header at all; otherwise the first text byte may just look like a length and the
// segment is left to `delimited`. Marker bytes inside an accepted payload are never
// inspected.
fn length_prefixed(bytes: &[u8], at: usize) -> Option<(&[u8], usize)> {
    let (len, header) = read_length(bytes.get(at..)?)?;
    let from = at.checked_add(header)?;
    let to = from.checked_add(len)?;
    let payload = bytes.get(from..to)?;

    if bytes[to..].starts_with(&SEGMENT_END) {
        Some((payload, to + SEGMENT_END.len()))
    } else if find(bytes, &SEGMENT_END, from).is_none() {
        Some((payload, to))
    } else {
        None
    }
}

fn read_length(header: &[u8]) -> Option<(usize, usize)> {
    match *header.first()? {
        TAG_U16 => {
            let raw: [u8; 2] = header.get(1..3)?.try_into().ok()?;
            Some((usize::from(u16::from_le_bytes(raw)), 3))
        }
        TAG_U32 => {
            let raw: [u8; 4] = header.get(1..5)?.try_into().ok()?;
            let len = usize::try_from(u32::from_le_bytes(raw)).ok()?;
            Some((len, 5))
        }
        short if short < 0x80 => Some((usize::from(short), 1)),
        _ => None,
    }
}

// Fallback for segments without a usable length header: the payload runs to the
// closing marker. A leading byte equal to the remaining length is a stray one-byte
// length and is dropped. The comparison is done in usize so payloads longer than
// 255 bytes are neither truncated nor misread.
fn delimited(bytes: &[u8], at: usize) -> Option<(&[u8], usize)> {
    let end = find(bytes, &SEGMENT_END, at)?;
    let mut payload = &bytes[at..end];
    if payload.len() > 1 && usize::from(payload[0]) == payload.len() - 1 {
        payload = &payload[1..];
    }
    Some((payload, end + SEGMENT_END.len()))
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|offset| from + offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefixed(text: &[u8]) -> Vec<u8> {
        let mut bytes = SEGMENT_START.to_vec();
        match text.len() {
            n if n < 0x80 => bytes.push(n as u8),
            n if n <= u16::MAX as usize => {
                bytes.push(TAG_U16);
                bytes.extend_from_slice(&(n as u16).to_le_bytes());
            }
            n => {
                bytes.push(TAG_U32);
                bytes.extend_from_slice(&(n as u32).to_le_bytes());
            }
        }
        bytes.extend_from_slice(text);
        bytes.extend_from_slice(&SEGMENT_END);
        bytes
    }

    fn delimited_only(text: &[u8]) -> Vec<u8> {
        let mut bytes = SEGMENT_START.to_vec();
        bytes.extend_from_slice(text);
        bytes.extend_from_slice(&SEGMENT_END);
        bytes
    }

    #[test]
    fn empty_input_is_empty() {
        assert_eq!(decode_attributed_body(&[]), "");
    }

    #[test]
    fn opening_marker_without_length_is_empty() {
        assert_eq!(decode_attributed_body(&[0x01, 0x2b]), "");
        assert_eq!(decode_attributed_body(&[0x01]), "");
        assert_eq!(decode_attributed_body(&[0x01, 0x2b, TAG_U16, 0x00]), "");
    }

    #[test]
    fn reads_short_length_prefixed_segment() {
        assert_eq!(decode_attributed_body(&prefixed(b"length prefixed")), "length prefixed");
    }

    #[test]
    fn reads_delimited_segment() {
        assert_eq!(decode_attributed_body(&delimited_only(b"fallback text")), "fallback text");
    }

    #[test]
    fn delimited_text_whose_first_byte_looks_like_its_length() {
        // 'H' is 0x48 = 72, which spans the 70 remaining bytes plus the closing marker.
        let text = format!("H{}", "i".repeat(70));
        assert_eq!(decode_attributed_body(&delimited_only(text.as_bytes())), text);
    }

    #[test]
    fn length_prefixed_segment_without_trailer_is_kept() {
        let mut bytes = vec![0x01, 0x2b, 0x05];
        bytes.extend_from_slice(b"hello");
        bytes.extend_from_slice(&[0x86, 0x92, 0x84]);
        assert_eq!(decode_attributed_body(&bytes), "hello");

        let mut at_end = vec![0x01, 0x2b, 0x02];
        at_end.extend_from_slice(b"ok");
        assert_eq!(decode_attributed_body(&at_end), "ok");
    }

    #[test]
    fn payload_of_exactly_256_bytes_is_not_truncated() {
        let text = "x".repeat(256);
        let decoded = decode_attributed_body(&prefixed(text.as_bytes()));
        assert_eq!(decoded.len(), 256);
        assert_eq!(decoded, text);
    }

    #[test]
    fn stray_length_byte_above_255_is_compared_without_wrapping() {
        // 257 bytes: a u8 counter would wrap to 1 and strip the wrong byte.
        let text = "y".repeat(257);
        assert_eq!(decode_attributed_body(&delimited_only(text.as_bytes())), text);

        let mut body = vec![200u8];
        body.extend_from_slice("z".repeat(200).as_bytes());
        assert_eq!(decode_attributed_body(&delimited_only(&body)), "z".repeat(200));
    }

    #[test]
    fn long_repeated_pattern_survives() {
        let text = "aaaaaaaaaaaa ".repeat(100);
        assert_eq!(decode_attributed_body(&delimited_only(text.as_bytes())), text);
        assert_eq!(decode_attributed_body(&prefixed(text.as_bytes())), text);
    }

    #[test]
    fn u32_length_header() {
        let text = "w".repeat(70_000);
        assert_eq!(decode_attributed_body(&prefixed(text.as_bytes())), text);
    }

    #[test]
    fn marker_bytes_inside_payload_are_not_structure() {
        // U+2184 encodes as e2 86 84, which contains the closing marker.
        let text = "ↄ start \u{1}+ middle ↄ end";
        assert_eq!(decode_attributed_body(&prefixed(text.as_bytes())), text);
    }

    #[test]
    fn multiple_segments_concatenate_in_order() {
        let mut bytes = vec![0x04, 0x0b, b's', b't', b'r', b'e', b'a', b'm'];
        bytes.extend(prefixed(b"first "));
        bytes.extend_from_slice(&[0x02, b'i', b'I']);
        bytes.extend(prefixed(b"second"));
        assert_eq!(decode_attributed_body(&bytes), "first second");
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let decoded = decode_attributed_body(&prefixed(&[b'o', 0xff, b'k']));
        assert_eq!(decoded, "o\u{fffd}k");
    }

    #[test]
    fn truncated_declared_length_falls_back_or_yields_nothing() {
        // Declares 100 bytes but only carries 3 and no closing marker.
        assert_eq!(decode_attributed_body(&[0x01, 0x2b, 100, b'a', b'b', b'c']), "");
    }

    #[test]
    fn arbitrary_bytes_never_panic() {
        let mut state: u32 = 0x1234_5678;
        for len in 0..512 {
            let bytes: Vec<u8> = (0..len)
                .map(|_| {
                    state ^= state << 13;
                    state ^= state >> 17;
                    state ^= state << 5;
                    match state % 7 {
                        0 => 0x01,
                        1 => 0x2b,
                        2 => 0x86,
                        3 => 0x84,
                        4 => 0x81,
                        _ => state as u8,
                    }
                })
                .collect();
            let _ = decode_attributed_body(&bytes);
        }
    }
}
