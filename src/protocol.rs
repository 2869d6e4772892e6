//! HEOS wire format
//!
//! Commands go out as `heos://group/verb?k=v&...\n`. Responses and events come
//! back as JSON objects terminated by `\r\n`, with a `heos` header whose
//! `message` field is itself a `key=value&...` var-string.

use crate::error::{HeosError, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// URI scheme used by every command
pub const SCHEME: &str = "heos";

/// Terminator of every response and event frame
pub const FRAME_DELIMITER: &[u8] = b"\r\n";

/// Characters escaped inside var-string values
const ESCAPES: [(char, &str); 3] = [('&', "%26"), ('=', "%3D"), ('%', "%25")];

/// Variables parsed from a var-string
pub type Vars = BTreeMap<String, String>;

/// A command to send to the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub group: String,
    pub verb: String,
    /// Parameters in the order they are serialized
    pub params: Vec<(String, String)>,
}

impl Command {
    /// Create a command with no parameters
    pub fn new(group: impl Into<String>, verb: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            verb: verb.into(),
            params: Vec::new(),
        }
    }

    /// Append a parameter
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    /// Append a parameter when `value` is present
    pub fn param_opt<V: ToString>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.param(key, value),
            None => self,
        }
    }

    /// The `group/verb` name responses echo back
    pub fn name(&self) -> String {
        format!("{}/{}", self.group, self.verb)
    }

    /// Serialize to the newline-terminated wire form
    pub fn encode(&self) -> String {
        let mut out = format!("{}://{}/{}", SCHEME, self.group, self.verb);
        if !self.params.is_empty() {
            out.push('?');
            let attributes = self
                .params
                .iter()
                .map(|(k, v)| format!("{}={}", k, encode_value(v)))
                .collect::<Vec<_>>()
                .join("&");
            out.push_str(&attributes);
        }
        out.push('\n');
        out
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encode().trim_end())
    }
}

/// Escape `&`, `=` and `%` in a value
pub fn encode_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match ESCAPES.iter().find(|(ch, _)| *ch == c) {
            Some((_, escaped)) => out.push_str(escaped),
            None => out.push(c),
        }
    }
    out
}

/// Reverse [`encode_value`]. Any other `%` sequence is kept literally.
pub fn decode_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(idx) = rest.find('%') {
        out.push_str(&rest[..idx]);
        let tail = &rest[idx..];
        match ESCAPES.iter().find(|(_, escaped)| {
            tail.len() >= 3 && tail.as_bytes()[..3].eq_ignore_ascii_case(escaped.as_bytes())
        }) {
            Some((ch, _)) => {
                out.push(*ch);
                rest = &tail[3..];
            }
            None => {
                out.push('%');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Parse a `key=value&flag&key2=value2` string.
///
/// A token without `=` maps to itself (`signed_in&un=me` yields
/// `signed_in -> signed_in`).
pub fn parse_var_string(input: &str) -> Vars {
    let mut vars = Vars::new();
    for token in input.split('&').filter(|t| !t.is_empty()) {
        match token.split_once('=') {
            Some((key, value)) => {
                vars.insert(key.to_string(), decode_value(value));
            }
            None => {
                vars.insert(token.to_string(), token.to_string());
            }
        }
    }
    vars
}

/// Inverse of [`parse_var_string`]
pub fn encode_var_string(vars: &Vars) -> String {
    vars.iter()
        .map(|(k, v)| format!("{}={}", k, encode_value(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Outcome flag of a response header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandResult {
    Success,
    Fail,
    /// No `result` key, as in push events
    Absent,
}

/// The `heos` block of a frame
#[derive(Debug, Clone, PartialEq)]
pub struct ResultHeader {
    pub command: String,
    pub result: CommandResult,
    pub message: String,
    pub vars: Vars,
}

/// The `payload` of a frame
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Payload {
    List(Vec<Value>),
    Record(Map<String, Value>),
    #[default]
    Absent,
}

impl Payload {
    fn from_value(value: Option<Value>) -> Self {
        match value {
            Some(Value::Array(items)) => Payload::List(items),
            Some(Value::Object(record)) => Payload::Record(record),
            _ => Payload::Absent,
        }
    }

    /// Number of list entries; a record counts as one
    pub fn len(&self) -> usize {
        match self {
            Payload::List(items) => items.len(),
            Payload::Record(_) => 1,
            Payload::Absent => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A decoded response frame
#[derive(Debug, Clone, PartialEq)]
pub struct HeosResult {
    pub header: ResultHeader,
    pub payload: Payload,
    /// The trimmed frame text as received
    pub raw: String,
}

impl HeosResult {
    pub fn succeeded(&self) -> bool {
        self.header.result == CommandResult::Success
    }

    /// Look up a header variable
    pub fn var(&self, key: &str) -> Option<&str> {
        self.header.vars.get(key).map(String::as_str)
    }

    /// Look up a header variable the caller cannot do without
    pub fn require_var(&self, key: &str) -> Result<&str> {
        self.var(key).ok_or_else(|| {
            HeosError::InvalidResponse(format!(
                "{} response has no '{}' in message '{}'",
                self.header.command, key, self.header.message
            ))
        })
    }

    /// Deserialize every entry of a list payload. A record payload yields one entry.
    pub fn items<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        match &self.payload {
            Payload::List(items) => items
                .iter()
                .map(|item| serde_json::from_value(item.clone()).map_err(HeosError::from))
                .collect(),
            Payload::Record(record) => {
                Ok(vec![serde_json::from_value(Value::Object(record.clone()))?])
            }
            Payload::Absent => Ok(Vec::new()),
        }
    }

    /// Deserialize a record payload
    pub fn record<T: DeserializeOwned>(&self) -> Result<T> {
        match &self.payload {
            Payload::Record(record) => Ok(serde_json::from_value(Value::Object(record.clone()))?),
            _ => Err(HeosError::InvalidResponse(format!(
                "{} response carries no payload record",
                self.header.command
            ))),
        }
    }
}

#[derive(Deserialize)]
struct RawFrame {
    heos: Option<RawHeader>,
    #[serde(default)]
    payload: Option<Value>,
}

#[derive(Deserialize)]
struct RawHeader {
    #[serde(default)]
    command: String,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Decode one frame. Surrounding whitespace, including the delimiter, is ignored.
pub fn decode_frame(frame: &[u8]) -> Result<HeosResult> {
    let text = std::str::from_utf8(frame)
        .map_err(|e| HeosError::MalformedFrame(format!("invalid UTF-8: {}", e)))?
        .trim();

    let parsed: RawFrame = serde_json::from_str(text)
        .map_err(|e| HeosError::MalformedFrame(format!("invalid JSON: {}", e)))?;

    let heos = parsed
        .heos
        .ok_or_else(|| HeosError::MalformedFrame("no \"heos\" block".to_string()))?;

    let result = match heos.result.as_deref() {
        None => CommandResult::Absent,
        Some(r) if r.eq_ignore_ascii_case("success") => CommandResult::Success,
        Some(r) if r.eq_ignore_ascii_case("fail") => CommandResult::Fail,
        Some(other) => {
            return Err(HeosError::MalformedFrame(format!(
                "unknown result '{}'",
                other
            )))
        }
    };

    let message = heos.message.unwrap_or_default();
    let vars = parse_var_string(&message);

    Ok(HeosResult {
        header: ResultHeader {
            command: heos.command,
            result,
            message,
            vars,
        },
        payload: Payload::from_value(parsed.payload),
        raw: text.to_string(),
    })
}
