//! Tool result envelopes.
//!
//! Every successful tool call produces a [`ToolResult`], serialised as
//! `{"content": [...]}`. Handlers may return anything implementing
//! [`IntoToolResult`]; the conversion is deterministic and keeps structured
//! data as JSON text rather than a lossy string rendering.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Content item in a tool call response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
    /// Base64-encoded image.
    Image {
        /// Base64 payload.
        data: String,
        /// MIME type, e.g. `image/png`.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

/// Result of a tool call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
}

impl ToolResult {
    /// Creates an empty result.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a result with a single text item.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::new().add_text(text)
    }

    /// Creates a result with a single pretty-printed JSON text item.
    #[must_use]
    pub fn json(data: &Value) -> Self {
        Self::new().add_json(data)
    }

    /// Appends a text item.
    #[must_use]
    pub fn add_text(mut self, text: impl Into<String>) -> Self {
        self.content.push(ToolContent::Text { text: text.into() });
        self
    }

    /// Appends an image item from already-encoded base64 data.
    #[must_use]
    pub fn add_image(mut self, data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        self.content.push(ToolContent::Image {
            data: data.into(),
            mime_type: mime_type.into(),
        });
        self
    }

    /// Appends an image item, base64-encoding the raw bytes.
    #[must_use]
    pub fn add_image_bytes(self, bytes: &[u8], mime_type: impl Into<String>) -> Self {
        self.add_image(BASE64_STANDARD.encode(bytes), mime_type)
    }

    /// Appends structured data as a pretty-printed JSON text item.
    #[must_use]
    pub fn add_json(self, data: &Value) -> Self {
        let text = serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string());
        self.add_text(text)
    }

    /// Converts to the wire representation.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({"content": []}))
    }
}

/// Normalises a handler's return value into a [`ToolResult`].
pub trait IntoToolResult {
    /// Performs the conversion.
    fn into_tool_result(self) -> ToolResult;
}

impl IntoToolResult for ToolResult {
    fn into_tool_result(self) -> ToolResult {
        self
    }
}

impl IntoToolResult for String {
    fn into_tool_result(self) -> ToolResult {
        ToolResult::text(self)
    }
}

impl IntoToolResult for &str {
    fn into_tool_result(self) -> ToolResult {
        ToolResult::text(self)
    }
}

impl IntoToolResult for Value {
    fn into_tool_result(self) -> ToolResult {
        match self {
            Self::String(text) => ToolResult::text(text),
            Self::Object(_) | Self::Array(_) => ToolResult::json(&self),
            scalar => ToolResult::text(scalar.to_string()),
        }
    }
}

macro_rules! display_result {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl IntoToolResult for $ty {
                fn into_tool_result(self) -> ToolResult {
                    ToolResult::text(self.to_string())
                }
            }
        )+
    };
}

display_result!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, bool, char);
