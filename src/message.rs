use serde::{Serialize, Serializer};

pub const CODE_FATAL: u32 = 500;
pub const CODE_PANIC: u32 = 555;
pub const TEXT_UNKNOWN_PANIC: &str = "unknown panic";

/// Severity of a log record. Encoded on the wire as its integer value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum LogLevel {
    Info = 0,
    Error = 1,
    Fatal = 2,
}

impl LogLevel {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl Serialize for LogLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.as_u32())
    }
}

/// One log entry as shipped to the exchange.
///
/// `project` and `code` are left out of the JSON when unset, so the minimal payload is
/// `{"level":0,"service":"orders","text":"started"}`.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct LogRecord {
    pub level: LogLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u32>,
    pub text: String,
}

impl LogRecord {
    pub fn new(level: LogLevel, service: &str, text: impl Into<String>) -> Self {
        LogRecord {
            level,
            project: None,
            service: service.to_string(),
            code: None,
            text: text.into(),
        }
    }

    pub fn with_project(mut self, project: Option<&str>) -> Self {
        self.project = project.map(str::to_string);
        self
    }

    pub fn with_code(mut self, code: Option<u32>) -> Self {
        self.code = code;
        self
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
