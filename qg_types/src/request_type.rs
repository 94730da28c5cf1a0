use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

/// Kind of provider call being admitted
///
/// The set is closed: every adapter maps its endpoints onto one of these.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    #[default]
    Text,
    Vision,
    Streaming,
    FunctionCalling,
}

impl RequestType {
    /// Number of variants, for dense per-type arrays
    pub const COUNT: usize = 4;

    pub const ALL: [RequestType; Self::COUNT] = [RequestType::Text, RequestType::Vision, RequestType::Streaming, RequestType::FunctionCalling];

    /// Dense index in `0..COUNT`
    #[inline(always)]
    pub const fn index(self) -> usize {
        match self {
            RequestType::Text => 0,
            RequestType::Vision => 1,
            RequestType::Streaming => 2,
            RequestType::FunctionCalling => 3,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            RequestType::Text => "text",
            RequestType::Vision => "vision",
            RequestType::Streaming => "streaming",
            RequestType::FunctionCalling => "function_calling",
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string names no known request type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRequestTypeError(pub String);

impl fmt::Display for ParseRequestTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown request type: {}", self.0)
    }
}

impl std::error::Error for ParseRequestTypeError {}

impl FromStr for RequestType {
    type Err = ParseRequestTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "text" | "chat" | "completion" => Ok(RequestType::Text),
            "vision" | "image" => Ok(RequestType::Vision),
            "streaming" | "stream" => Ok(RequestType::Streaming),
            "function_calling" | "functioncalling" | "tools" | "tool_use" => Ok(RequestType::FunctionCalling),
            _ => Err(ParseRequestTypeError(s.to_string())),
        }
    }
}
