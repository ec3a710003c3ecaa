//! Opaque source location tags.
//!
//! The resolver never interprets locations. A hosting tool attaches a
//! `SourceTag` to parsed type expressions and gets the same tag back on the
//! diagnostics those expressions caused.

use serde::{Deserialize, Serialize};

/// A location in some file known only to the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct SourceTag {
    /// Host-assigned file identifier.
    pub file: u32,
    /// Start offset within the file.
    pub start: u32,
    /// Length of the tagged range.
    pub length: u32,
}

impl SourceTag {
    #[inline]
    pub const fn new(file: u32, start: u32, length: u32) -> Self {
        SourceTag {
            file,
            start,
            length,
        }
    }

    /// End offset (exclusive), saturating on overflow.
    #[inline]
    pub const fn end(self) -> u32 {
        self.start.saturating_add(self.length)
    }
}
