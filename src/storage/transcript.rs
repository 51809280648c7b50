//! Transcript text format.
//!
//! Each message is stored as a block `\n[<timestamp>] <ROLE>: <text>\n`. The
//! text is not escaped, so a message line that itself looks like a header
//! will be read back as the start of a new message.

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Author of a transcript message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// User input.
    User,
    /// Assistant response.
    Assistant,
}

impl Role {
    /// Map any caller-supplied role onto `user` or `assistant`.
    ///
    /// `assistant` and the legacy `ai` map to [`Role::Assistant`]; anything
    /// else, unknown values included, becomes [`Role::User`].
    #[must_use]
    pub fn normalize(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "assistant" | "ai" => Self::Assistant,
            _ => Self::User,
        }
    }

    /// Stable lowercase form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Uppercase tag written in transcript headers.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Assistant => "ASSISTANT",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "assistant" | "ai" => Ok(Self::Assistant),
            _ => Err(value.to_string()),
        }
    }
}

/// Render one message block.
#[must_use]
pub fn format_block(timestamp: &str, role: Role, text: &str) -> String {
    format!("\n[{timestamp}] {}: {text}\n", role.tag())
}

/// One message read back from a transcript.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    /// Header timestamp.
    pub timestamp: String,
    /// Author.
    pub role: Role,
    /// Message text, continuation lines included.
    pub text: String,
}

/// Parses transcript text back into messages.
#[derive(Clone, Debug)]
pub struct TranscriptParser {
    header: Regex,
}

impl TranscriptParser {
    /// Compile the header pattern.
    ///
    /// # Errors
    /// Returns an error if the pattern fails to compile.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            header: Regex::new(
                r"^\[(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}(?:\.\d+)?)\] (?i:(USER|ASSISTANT|AI)): ?(.*)$",
            )?,
        })
    }

    /// Split a transcript into messages.
    ///
    /// Lines before the first header are ignored. The blank separator line
    /// that the block format puts after each message is dropped.
    #[must_use]
    pub fn parse(&self, raw: &str) -> Vec<TranscriptMessage> {
        let mut messages = Vec::new();
        let mut current: Option<(TranscriptMessage, Vec<&str>)> = None;

        for line in raw.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if let Some(caps) = self.header.captures(line) {
                if let Some(done) = current.take() {
                    messages.push(finish(done));
                }
                let role = caps
                    .get(2)
                    .and_then(|m| m.as_str().parse().ok())
                    .unwrap_or(Role::User);
                let message = TranscriptMessage {
                    timestamp: caps.get(1).map_or("", |m| m.as_str()).to_string(),
                    role,
                    text: String::new(),
                };
                let first = caps.get(3).map_or("", |m| m.as_str());
                current = Some((message, vec![first]));
            } else if let Some((_, lines)) = current.as_mut() {
                lines.push(line);
            }
        }

        if let Some(done) = current.take() {
            messages.push(finish(done));
        }
        messages
    }

    /// First non-empty line of the first user message, if any.
    ///
    /// The text on the `USER` header line counts as the message's first
    /// line, so a single-line message titles the conversation by itself.
    #[must_use]
    pub fn first_user_line(&self, raw: &str) -> Option<String> {
        self.parse(raw)
            .into_iter()
            .filter(|message| message.role == Role::User)
            .find_map(|message| {
                message
                    .text
                    .lines()
                    .map(str::trim)
                    .find(|line| !line.is_empty())
                    .map(str::to_string)
            })
    }
}

fn finish((mut message, mut lines): (TranscriptMessage, Vec<&str>)) -> TranscriptMessage {
    if lines.len() > 1 && lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    message.text = lines.join("\n");
    message
}
