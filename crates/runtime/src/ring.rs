// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded output ring retaining the newest characters.
//!
//! Child output is folded into a fixed-size buffer; when the cap is
//! exceeded only the tail survives. Offsets in [`RingBuffer::slice`] are
//! character offsets into the retained content.

/// Default capacity for session/exec output streams, in characters.
pub const OUTPUT_CAP: usize = 200_000;

/// A character-bounded string ring.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    buf: String,
    cap: usize,
}

/// One paged slice of a ring.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RingSlice {
    pub output: String,
    pub total: usize,
    pub next_offset: usize,
    pub has_more: bool,
}

impl RingBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            buf: String::new(),
            cap,
        }
    }

    /// Append text, discarding the oldest characters past the cap.
    pub fn push_str(&mut self, text: &str) {
        self.buf.push_str(text);
        let len = self.char_len();
        if len > self.cap {
            let drop = len - self.cap;
            let boundary = self
                .buf
                .char_indices()
                .nth(drop)
                .map(|(i, _)| i)
                .unwrap_or(self.buf.len());
            self.buf.drain(..boundary);
        }
    }

    /// Retained content length in characters.
    pub fn char_len(&self) -> usize {
        self.buf.chars().count()
    }

    /// Full retained content.
    pub fn contents(&self) -> &str {
        &self.buf
    }

    /// Exact slice by character offset and limit.
    pub fn slice(&self, offset: usize, limit: usize) -> RingSlice {
        let total = self.char_len();
        let start = offset.min(total);
        let output: String = self.buf.chars().skip(start).take(limit).collect();
        let next_offset = start + output.chars().count();
        RingSlice {
            output,
            total,
            next_offset,
            has_more: next_offset < total,
        }
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new(OUTPUT_CAP)
    }
}

#[cfg(test)]
#[path = "ring_tests.rs"]
mod tests;
