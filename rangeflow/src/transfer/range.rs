//! Inclusive byte ranges and HTTP `Range` header parsing.

use std::fmt;

use crate::error::{TransferError, TransferResult};

/// A non-empty, inclusive byte range inside an object of known size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    start: u64,
    end: u64,
}

impl ByteRange {
    /// Validate `start..=end` against an object of `total_size` bytes.
    ///
    /// Requires `start <= end < total_size`.
    pub fn new(start: u64, end: u64, total_size: u64) -> TransferResult<Self> {
        if start > end || end >= total_size {
            return Err(TransferError::InvalidRange {
                start,
                end,
                total_size,
            });
        }
        Ok(Self { start, end })
    }

    /// The whole object, or `None` for an empty one.
    pub fn full(total_size: u64) -> Option<Self> {
        (total_size > 0).then(|| Self {
            start: 0,
            end: total_size - 1,
        })
    }

    /// Parse a single-range `Range` header value.
    ///
    /// Accepts `bytes=a-b`, `bytes=a-` and the suffix form `bytes=-n`.
    /// An end past the object is clamped to the last byte; a suffix longer
    /// than the object selects the whole object. Multi-range requests and
    /// other units are rejected with [`TransferError::UnsupportedRange`];
    /// ranges that cannot be satisfied yield [`TransferError::InvalidRange`].
    pub fn parse_header(header: &str, total_size: u64) -> TransferResult<Self> {
        let unsupported = || TransferError::UnsupportedRange(header.to_string());

        let set = header
            .trim()
            .strip_prefix("bytes=")
            .ok_or_else(unsupported)?
            .trim();
        if set.contains(',') {
            return Err(unsupported());
        }

        let (first, last) = set.split_once('-').ok_or_else(unsupported)?;
        let (first, last) = (first.trim(), last.trim());
        let parse = |s: &str| s.parse::<u64>().map_err(|_| unsupported());

        let (start, end) = match (first.is_empty(), last.is_empty()) {
            (true, true) => return Err(unsupported()),
            // bytes=-n: the final n bytes
            (true, false) => {
                let suffix = parse(last)?;
                if suffix == 0 || total_size == 0 {
                    return Err(TransferError::InvalidRange {
                        start: total_size,
                        end: total_size,
                        total_size,
                    });
                }
                (total_size.saturating_sub(suffix), total_size - 1)
            }
            // bytes=a-: from a to the end
            (false, true) => {
                let start = parse(first)?;
                (start, total_size.saturating_sub(1).max(start))
            }
            (false, false) => {
                let start = parse(first)?;
                let end = parse(last)?;
                if start > end {
                    return Err(TransferError::InvalidRange {
                        start,
                        end,
                        total_size,
                    });
                }
                (start, end.min(total_size.saturating_sub(1)).max(start))
            }
        };

        Self::new(start, end, total_size)
    }

    /// First byte.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Last byte (inclusive).
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of bytes covered; never zero.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Returns true if the range covers all of an object of `total_size` bytes.
    pub fn is_full(&self, total_size: u64) -> bool {
        self.start == 0 && self.end + 1 == total_size
    }

    /// `Content-Range` header value for a partial response.
    pub fn content_range(&self, total_size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total_size)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_validates_bounds() {
        assert!(ByteRange::new(0, 9, 10).is_ok());
        assert!(matches!(
            ByteRange::new(5, 4, 10),
            Err(TransferError::InvalidRange { .. })
        ));
        assert!(matches!(
            ByteRange::new(0, 10, 10),
            Err(TransferError::InvalidRange { .. })
        ));
        assert!(ByteRange::new(0, 0, 0).is_err());
    }

    #[test]
    fn test_full() {
        assert_eq!(ByteRange::full(0), None);
        let range = ByteRange::full(100).unwrap();
        assert_eq!((range.start(), range.end(), range.len()), (0, 99, 100));
        assert!(range.is_full(100));
    }

    #[test]
    fn test_parse_closed_range() {
        let range = ByteRange::parse_header("bytes=1000-1999", 10_000).unwrap();
        assert_eq!((range.start(), range.end()), (1000, 1999));
        assert_eq!(range.len(), 1000);
        assert_eq!(range.content_range(10_000), "bytes 1000-1999/10000");
        assert!(!range.is_full(10_000));
    }

    #[test]
    fn test_parse_open_ended() {
        let range = ByteRange::parse_header("bytes=500-", 1000).unwrap();
        assert_eq!((range.start(), range.end()), (500, 999));
    }

    #[test]
    fn test_parse_suffix() {
        let range = ByteRange::parse_header("bytes=-100", 1000).unwrap();
        assert_eq!((range.start(), range.end()), (900, 999));

        // Longer than the object: whole object
        let range = ByteRange::parse_header("bytes=-5000", 1000).unwrap();
        assert_eq!((range.start(), range.end()), (0, 999));
    }

    #[test]
    fn test_parse_clamps_end() {
        let range = ByteRange::parse_header("bytes=0-99999", 1000).unwrap();
        assert_eq!(range.end(), 999);
    }

    #[test]
    fn test_parse_unsatisfiable() {
        assert!(matches!(
            ByteRange::parse_header("bytes=1000-1100", 1000),
            Err(TransferError::InvalidRange { .. })
        ));
        assert!(matches!(
            ByteRange::parse_header("bytes=1000-", 1000),
            Err(TransferError::InvalidRange { .. })
        ));
        assert!(matches!(
            ByteRange::parse_header("bytes=20-10", 1000),
            Err(TransferError::InvalidRange { .. })
        ));
        assert!(matches!(
            ByteRange::parse_header("bytes=-0", 1000),
            Err(TransferError::InvalidRange { .. })
        ));
        assert!(ByteRange::parse_header("bytes=0-", 0).is_err());
    }

    #[test]
    fn test_parse_unsupported() {
        for header in [
            "bytes=0-1,5-6",
            "items=0-1",
            "bytes=",
            "bytes=-",
            "bytes=abc-def",
            "0-100",
        ] {
            assert!(
                matches!(
                    ByteRange::parse_header(header, 1000),
                    Err(TransferError::UnsupportedRange(_))
                ),
                "header {header:?} should be unsupported"
            );
        }
    }

    #[test]
    fn test_display() {
        let range = ByteRange::new(3, 7, 10).unwrap();
        assert_eq!(range.to_string(), "3-7");
    }
}
