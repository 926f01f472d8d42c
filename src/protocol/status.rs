//! Connection status notifications pushed to registered callers.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// StatusText
// ============================================================================

/// Connection phase reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusText {
    /// A connect attempt is in flight.
    Connecting,
    /// The connection is usable.
    Connected,
    /// The connection dropped or an attempt failed.
    Disconnected,
}

impl StatusText {
    /// Indicator colour for this phase.
    #[inline]
    #[must_use]
    pub const fn fill(self) -> StatusFill {
        match self {
            Self::Connecting => StatusFill::Yellow,
            Self::Connected => StatusFill::Green,
            Self::Disconnected => StatusFill::Red,
        }
    }

    /// Wire spelling.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for StatusText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// StatusFill / StatusShape
// ============================================================================

/// Indicator colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFill {
    /// Connecting.
    Yellow,
    /// Connected.
    Green,
    /// Disconnected.
    Red,
}

/// Indicator shape. Only `dot` is used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusShape {
    /// Filled dot.
    #[default]
    Dot,
}

// ============================================================================
// Status
// ============================================================================

/// Status object delivered to every registered caller.
///
/// # Format
///
/// ```json
/// { "fill": "green", "shape": "dot", "text": "connected" }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Status {
    /// Indicator colour.
    pub fill: StatusFill,
    /// Indicator shape.
    pub shape: StatusShape,
    /// Connection phase.
    pub text: StatusText,
}

impl Status {
    /// `connecting` status.
    pub const CONNECTING: Self = Self::new(StatusText::Connecting);
    /// `connected` status.
    pub const CONNECTED: Self = Self::new(StatusText::Connected);
    /// `disconnected` status.
    pub const DISCONNECTED: Self = Self::new(StatusText::Disconnected);

    /// Builds the status for a phase.
    #[inline]
    #[must_use]
    pub const fn new(text: StatusText) -> Self {
        Self {
            fill: text.fill(),
            shape: StatusShape::Dot,
            text,
        }
    }
}

impl From<StatusText> for Status {
    fn from(text: StatusText) -> Self {
        Self::new(text)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_wire_format() {
        let value = serde_json::to_value(Status::CONNECTED).expect("serialize");
        assert_eq!(
            value,
            json!({"fill": "green", "shape": "dot", "text": "connected"})
        );
    }

    #[test]
    fn test_status_fills() {
        assert_eq!(Status::CONNECTING.fill, StatusFill::Yellow);
        assert_eq!(Status::DISCONNECTED.fill, StatusFill::Red);
    }

    #[test]
    fn test_status_text_display() {
        assert_eq!(StatusText::Disconnected.to_string(), "disconnected");
    }
}
