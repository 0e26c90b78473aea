//! Splitting a resource of known size into contiguous byte ranges.

/// One contiguous byte range `[start, end)` of the resource, handled by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// 1-based, also the row of the segment in the status display.
    pub id: usize,
    pub start: u64,
    pub end: u64,
}

impl Segment {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Value of the `Range` header for this segment.
    ///
    /// HTTP ranges are inclusive on both ends, so the last byte is `end - 1`.
    /// Only meaningful for non-empty segments.
    pub fn range_header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end - 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadPlan {
    pub total_size: u64,
    pub segments: Vec<Segment>,
}

/// Splits `total_size` bytes into `n` segments (`n` is clamped to at least 1).
///
/// The remainder of the division goes entirely to the first segment.
pub fn plan(total_size: u64, n: usize) -> DownloadPlan {
    let n = n.max(1) as u64;
    let remainder = total_size % n;
    let base = (total_size - remainder) / n;

    let mut segments = Vec::with_capacity(n as usize);
    let mut start = 0;
    for i in 0..n {
        let len = if i == 0 { base + remainder } else { base };
        segments.push(Segment {
            id: i as usize + 1,
            start,
            end: start + len,
        });
        start += len;
    }

    DownloadPlan {
        total_size,
        segments,
    }
}
