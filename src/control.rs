//! Reassembly of control-channel replies.
//!
//! The headset answers commands with a JSON object split over as many
//! 19-character notifications as it needs. A fragment ending in `}` closes
//! the message.

/// Buffers control fragments until one closes the message.
#[derive(Debug, Clone, Default)]
pub struct ControlMessageAssembler {
    buffer: String,
}

impl ControlMessageAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `fragment`. Returns the whole message, and empties the buffer,
    /// when the fragment itself ends with `}`.
    pub fn feed(&mut self, fragment: &str) -> Option<String> {
        self.buffer.push_str(fragment);
        if fragment.ends_with('}') {
            Some(std::mem::take(&mut self.buffer))
        } else {
            None
        }
    }

    /// Text received since the last completed message.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
