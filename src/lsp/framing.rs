//! LSP length-prefixed framing codec (spec.md §4.3): `Content-Length: N`
//! headers terminated by `\r\n\r\n` or `\n\n`, over an in-place receive
//! buffer that shifts on discard rather than reallocating per frame.

/// Cap on frames decoded per poll tick, bounding worst-case per-tick latency
/// under a server flooding diagnostics (spec.md §4.3, §4.4.7).
pub const MAX_FRAMES_PER_TICK: usize = 24;

pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 32);
    out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", payload.len()).as_bytes());
    out.extend_from_slice(payload);
    out
}

/// Find the end of the next header block (the index just past the
/// terminator), accepting either `\r\n\r\n` or `\n\n`.
fn find_header_end(buf: &[u8]) -> Option<usize> {
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4);
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|i| i + 2);
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

fn parse_content_length(header: &[u8]) -> Option<usize> {
    let header = std::str::from_utf8(header).ok()?;
    for line in header.split(['\r', '\n']) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.splitn(2, ':');
        let name = parts.next()?.trim();
        let value = parts.next()?.trim();
        if name.eq_ignore_ascii_case("Content-Length") {
            return value.parse().ok();
        }
    }
    None
}

/// Decode as many complete frames as are available in `buf`, up to
/// [`MAX_FRAMES_PER_TICK`]. Consumed bytes (including any skipped malformed
/// headers) are drained from `buf` in place.
pub fn decode_frames(buf: &mut Vec<u8>) -> Vec<Vec<u8>> {
    let mut frames = Vec::new();
    while frames.len() < MAX_FRAMES_PER_TICK {
        let Some(header_end) = find_header_end(buf) else {
            break;
        };
        let Some(len) = parse_content_length(&buf[..header_end]) else {
            // Malformed header: discard it and keep scanning.
            buf.drain(..header_end);
            continue;
        };
        if buf.len() < header_end + len {
            break;
        }
        let payload = buf[header_end..header_end + len].to_vec();
        buf.drain(..header_end + len);
        frames.push(payload);
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let frame = encode_frame(b"hello");
        let mut buf = frame;
        let frames = decode_frames(&mut buf);
        assert_eq!(frames, vec![b"hello".to_vec()]);
        assert!(buf.is_empty());
    }

    #[test]
    fn arbitrary_chunk_splits_yield_same_payloads_s5() {
        let whole = encode_frame(b"hello");
        for split in 0..=whole.len() {
            let mut buf = Vec::new();
            buf.extend_from_slice(&whole[..split]);
            let mut frames = decode_frames(&mut buf);
            buf.extend_from_slice(&whole[split..]);
            frames.extend(decode_frames(&mut buf));
            assert_eq!(frames, vec![b"hello".to_vec()], "split at {split}");
        }
    }

    #[test]
    fn accepts_lf_only_separator() {
        let mut buf = b"Content-Length: 5\n\nhello".to_vec();
        let frames = decode_frames(&mut buf);
        assert_eq!(frames, vec![b"hello".to_vec()]);
    }

    #[test]
    fn waits_for_full_payload() {
        let mut buf = b"Content-Length: 5\r\n\r\nhel".to_vec();
        let frames = decode_frames(&mut buf);
        assert!(frames.is_empty());
        buf.extend_from_slice(b"lo");
        let frames = decode_frames(&mut buf);
        assert_eq!(frames, vec![b"hello".to_vec()]);
    }

    #[test]
    fn skips_garbage_header_without_content_length() {
        let mut buf = b"X-Bogus: true\r\n\r\nContent-Length: 2\r\n\r\nhi".to_vec();
        let frames = decode_frames(&mut buf);
        assert_eq!(frames, vec![b"hi".to_vec()]);
    }

    #[test]
    fn case_insensitive_header_name() {
        let mut buf = b"content-length: 2\r\n\r\nhi".to_vec();
        let frames = decode_frames(&mut buf);
        assert_eq!(frames, vec![b"hi".to_vec()]);
    }

    #[test]
    fn caps_frames_per_tick() {
        let mut buf = Vec::new();
        for _ in 0..30 {
            buf.extend_from_slice(&encode_frame(b"x"));
        }
        let frames = decode_frames(&mut buf);
        assert_eq!(frames.len(), MAX_FRAMES_PER_TICK);
        let rest = decode_frames(&mut buf);
        assert_eq!(rest.len(), 30 - MAX_FRAMES_PER_TICK);
    }
}
