//! HTTP/1.x request framing.
//!
//! Decides whether the bytes buffered so far hold one complete request and, if
//! so, how many of them belong to it. This is not an HTTP parser: only the
//! header terminator and the `Content-Length` header are inspected.
//!
//! The detector is stateless. Calling it again on a longer prefix of the same
//! stream re-scans from the start, so it can never report a completion shorter
//! than the one it would report on the full message.

use thiserror::Error;

use crate::config::BufferConfig;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Why a request was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramingError {
    #[error("header block exceeds {limit} bytes")]
    HeaderTooLarge { limit: usize },

    #[error("declared body of {declared} bytes exceeds {limit} bytes")]
    BodyTooLarge { declared: usize, limit: usize },

    #[error("invalid Content-Length value {0:?}")]
    InvalidContentLength(String),

    #[error("conflicting Content-Length values {first} and {second}")]
    ConflictingContentLength { first: usize, second: usize },

    #[error("Transfer-Encoding is not supported")]
    UnsupportedTransferEncoding,
}

/// Byte layout of a complete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestFrame {
    /// Bytes up to and including the blank line.
    pub header_len: usize,
    /// Declared body length (0 when no Content-Length was sent).
    pub body_len: usize,
}

impl RequestFrame {
    /// Header block plus body, in bytes.
    pub fn total_len(&self) -> usize {
        self.header_len + self.body_len
    }
}

/// Outcome of a framing attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Framing {
    /// More bytes are needed.
    Incomplete,
    /// The first `frame.total_len()` bytes are one request.
    Complete(RequestFrame),
    /// The request can never become valid.
    Malformed(FramingError),
}

/// Size limits enforced while framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramingLimits {
    pub max_header_bytes: usize,
    pub max_body_bytes: usize,
}

impl Default for FramingLimits {
    fn default() -> Self {
        Self {
            max_header_bytes: 16 * 1024,
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

impl From<&BufferConfig> for FramingLimits {
    fn from(config: &BufferConfig) -> Self {
        Self {
            max_header_bytes: config.max_header_bytes,
            max_body_bytes: config.max_body_bytes,
        }
    }
}

/// Stateless request framing detector.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestFramer {
    limits: FramingLimits,
}

impl RequestFramer {
    pub fn new(limits: FramingLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> FramingLimits {
        self.limits
    }

    /// Frame the request at the start of `data`.
    pub fn detect(&self, data: &[u8]) -> Framing {
        let header_len = match find_header_end(data) {
            Some(len) => len,
            None if data.len() > self.limits.max_header_bytes => {
                return Framing::Malformed(FramingError::HeaderTooLarge {
                    limit: self.limits.max_header_bytes,
                });
            }
            None => return Framing::Incomplete,
        };

        if header_len > self.limits.max_header_bytes {
            return Framing::Malformed(FramingError::HeaderTooLarge {
                limit: self.limits.max_header_bytes,
            });
        }

        let body_len = match content_length(&data[..header_len]) {
            Ok(len) => len.unwrap_or(0),
            Err(e) => return Framing::Malformed(e),
        };

        if body_len > self.limits.max_body_bytes {
            return Framing::Malformed(FramingError::BodyTooLarge {
                declared: body_len,
                limit: self.limits.max_body_bytes,
            });
        }

        let frame = RequestFrame {
            header_len,
            body_len,
        };
        if data.len() < frame.total_len() {
            return Framing::Incomplete;
        }

        Framing::Complete(frame)
    }
}

/// Offset just past the first `\r\n\r\n`, if any.
fn find_header_end(data: &[u8]) -> Option<usize> {
    data.windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
        .map(|pos| pos + HEADER_TERMINATOR.len())
}

/// Extract the declared body length from a complete header block.
fn content_length(headers: &[u8]) -> Result<Option<usize>, FramingError> {
    let mut declared: Option<usize> = None;

    // The request line never carries a header.
    for line in headers.split(|&b| b == b'\n').skip(1) {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let Some(colon) = line.iter().position(|&b| b == b':') else {
            continue;
        };
        let (name, value) = (&line[..colon], line[colon + 1..].trim_ascii());

        if name.eq_ignore_ascii_case(b"transfer-encoding") {
            return Err(FramingError::UnsupportedTransferEncoding);
        }
        if !name.eq_ignore_ascii_case(b"content-length") {
            continue;
        }

        let len = parse_decimal(value).ok_or_else(|| {
            FramingError::InvalidContentLength(String::from_utf8_lossy(value).into_owned())
        })?;

        match declared {
            Some(first) if first != len => {
                return Err(FramingError::ConflictingContentLength { first, second: len });
            }
            _ => declared = Some(len),
        }
    }

    Ok(declared)
}

fn parse_decimal(digits: &[u8]) -> Option<usize> {
    if digits.is_empty() {
        return None;
    }
    digits.iter().try_fold(0usize, |acc, &b| {
        if !b.is_ascii_digit() {
            return None;
        }
        acc.checked_mul(10)?.checked_add(usize::from(b - b'0'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &[u8] = b"POST /x HTTP/1.1\r\nContent-Length: 3\r\n\r\nxyz";

    fn framer() -> RequestFramer {
        RequestFramer::default()
    }

    #[test]
    fn incomplete_headers() {
        let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n";
        assert_eq!(framer().detect(req), Framing::Incomplete);
    }

    #[test]
    fn complete_headers_without_body() {
        let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";
        assert_eq!(
            framer().detect(req),
            Framing::Complete(RequestFrame {
                header_len: req.len(),
                body_len: 0
            })
        );
    }

    #[test]
    fn body_still_arriving() {
        let req = b"POST /submit HTTP/1.1\r\nHost: example.com\r\nContent-Length: 10\r\n\r\n12345";
        assert_eq!(framer().detect(req), Framing::Incomplete);
    }

    #[test]
    fn simple_message_frames_at_39_plus_3() {
        assert_eq!(
            framer().detect(SIMPLE),
            Framing::Complete(RequestFrame {
                header_len: 39,
                body_len: 3
            })
        );
    }

    #[test]
    fn header_name_is_case_insensitive() {
        let req = b"POST /x HTTP/1.1\r\nhost: example.com\r\ncOnTeNt-LeNgTh:   3  \r\n\r\nxyz";
        match framer().detect(req) {
            Framing::Complete(frame) => assert_eq!(frame.body_len, 3),
            other => panic!("expected complete, got {other:?}"),
        }
    }

    #[test]
    fn trailing_bytes_are_not_part_of_the_frame() {
        let mut req = SIMPLE.to_vec();
        req.extend_from_slice(b"GET /next HTTP/1.1\r\n");
        match framer().detect(&req) {
            Framing::Complete(frame) => assert_eq!(frame.total_len(), SIMPLE.len()),
            other => panic!("expected complete, got {other:?}"),
        }
    }

    #[test]
    fn growing_prefix_never_completes_early() {
        for end in 0..SIMPLE.len() {
            assert_eq!(
                framer().detect(&SIMPLE[..end]),
                Framing::Incomplete,
                "prefix of {end} bytes"
            );
        }
        assert!(matches!(framer().detect(SIMPLE), Framing::Complete(_)));
    }

    #[test]
    fn split_mid_header_completes_only_after_second_read() {
        let (first, _) = SIMPLE.split_at(20);
        assert_eq!(framer().detect(first), Framing::Incomplete);
        assert!(matches!(framer().detect(SIMPLE), Framing::Complete(_)));
    }

    #[test]
    fn non_numeric_length_is_malformed() {
        let req = b"POST / HTTP/1.1\r\nContent-Length: 12abc\r\n\r\n";
        assert_eq!(
            framer().detect(req),
            Framing::Malformed(FramingError::InvalidContentLength("12abc".into()))
        );
    }

    #[test]
    fn empty_length_is_malformed() {
        let req = b"POST / HTTP/1.1\r\nContent-Length:\r\n\r\n";
        assert!(matches!(
            framer().detect(req),
            Framing::Malformed(FramingError::InvalidContentLength(_))
        ));
    }

    #[test]
    fn overflowing_length_is_malformed() {
        let req = b"POST / HTTP/1.1\r\nContent-Length: 999999999999999999999999\r\n\r\n";
        assert!(matches!(
            framer().detect(req),
            Framing::Malformed(FramingError::InvalidContentLength(_))
        ));
    }

    #[test]
    fn conflicting_lengths_are_malformed() {
        let req = b"POST / HTTP/1.1\r\nContent-Length: 3\r\nContent-Length: 4\r\n\r\nabcd";
        assert_eq!(
            framer().detect(req),
            Framing::Malformed(FramingError::ConflictingContentLength { first: 3, second: 4 })
        );
    }

    #[test]
    fn repeated_identical_lengths_are_accepted() {
        let req = b"POST / HTTP/1.1\r\nContent-Length: 2\r\ncontent-length: 2\r\n\r\nab";
        assert!(matches!(framer().detect(req), Framing::Complete(_)));
    }

    #[test]
    fn transfer_encoding_is_rejected() {
        let req = b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n";
        assert_eq!(
            framer().detect(req),
            Framing::Malformed(FramingError::UnsupportedTransferEncoding)
        );
    }

    #[test]
    fn oversized_header_without_terminator_is_malformed() {
        let framer = RequestFramer::new(FramingLimits {
            max_header_bytes: 32,
            max_body_bytes: 1024,
        });
        let req = [b'a'; 33];
        assert_eq!(
            framer.detect(&req),
            Framing::Malformed(FramingError::HeaderTooLarge { limit: 32 })
        );
        assert_eq!(framer.detect(&req[..32]), Framing::Incomplete);
    }

    #[test]
    fn oversized_body_is_malformed() {
        let framer = RequestFramer::new(FramingLimits {
            max_header_bytes: 1024,
            max_body_bytes: 2,
        });
        assert_eq!(
            framer.detect(SIMPLE),
            Framing::Malformed(FramingError::BodyTooLarge {
                declared: 3,
                limit: 2
            })
        );
    }

    #[test]
    fn length_in_request_line_is_ignored() {
        let req = b"GET /content-length:5 HTTP/1.1\r\n\r\n";
        match framer().detect(req) {
            Framing::Complete(frame) => assert_eq!(frame.body_len, 0),
            other => panic!("expected complete, got {other:?}"),
        }
    }
}
