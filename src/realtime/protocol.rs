// src/realtime/protocol.rs
//! The JSON messages exchanged over `/ws/logs`.
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::parser::ParsedLine;

fn follow_by_default() -> bool {
    true
}

/// A message from the client.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Start (or replace) a subscription.
    #[serde(rename_all = "camelCase")]
    Subscribe {
        /// The subscription id; also the catalog file id when `file_path` is absent.
        file_id: String,
        /// The plugin owning `file_path`.
        plugin_id: Option<String>,
        /// An explicit file to follow.
        file_path: Option<PathBuf>,
        /// Overrides the log type derived from the file name.
        log_type: Option<String>,
        /// Whether to keep delivering appended lines after the replay.
        #[serde(default = "follow_by_default")]
        follow: bool,
        /// Replay starts after this line.
        #[serde(default)]
        from_line: usize,
    },

    /// Cancel a subscription.
    #[serde(rename_all = "camelCase")]
    Unsubscribe {
        /// The subscription id.
        file_id: String,
    },

    /// Filter the lines delivered for a subscription.
    #[serde(rename_all = "camelCase")]
    Filter {
        /// The subscription id.
        file_id: String,
        /// Only deliver entries with this level (case-insensitive).
        level: Option<String>,
        /// Only deliver lines containing this text (case-insensitive).
        search: Option<String>,
    },
}

/// A message to the client.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Sent once when the connection opens.
    Connected {
        /// A greeting.
        message: String,
    },

    /// A subscription was accepted.
    #[serde(rename_all = "camelCase")]
    Subscribed {
        /// The subscription id.
        file_id: String,
        /// The size of the file when subscribing.
        size: u64,
        /// Whether the file is compressed (and so won't be followed).
        compressed: bool,
        /// Whether the file is a rotated variant.
        rotated: bool,
        /// Whether appended lines will be delivered.
        follow: bool,
    },

    /// One line of a subscribed file.
    #[serde(rename_all = "camelCase")]
    LogLine {
        /// The subscription id.
        file_id: String,
        /// The parsed line.
        log: ParsedLine,
        /// The line's position in the file.
        line_number: usize,
    },

    /// Something went wrong.
    #[serde(rename_all = "camelCase")]
    Error {
        /// The subscription concerned, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        file_id: Option<String>,
        /// What went wrong.
        message: String,
    },

    /// A subscription was cancelled.
    #[serde(rename_all = "camelCase")]
    Unsubscribed {
        /// The subscription id.
        file_id: String,
    },

    /// A filter was stored for a subscription.
    #[serde(rename_all = "camelCase")]
    FilterApplied {
        /// The subscription id.
        file_id: String,
    },
}

impl ServerMessage {
    pub(super) fn error(file_id: Option<&str>, message: impl ToString) -> Self {
        ServerMessage::Error {
            file_id: file_id.map(str::to_string),
            message: message.to_string(),
        }
    }

    pub(super) fn log_line(file_id: &str, log: ParsedLine) -> Self {
        ServerMessage::LogLine {
            file_id: file_id.to_string(),
            line_number: log.raw.line_number,
            log,
        }
    }
}
