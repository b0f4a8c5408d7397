use std::process::Command;

use tracing::{info, warn};

use crate::error::{BridgeError, Result};

/// Make `raw` safe to place between double quotes in an AppleScript
/// string literal: backslashes are doubled and quotes become `\"`.
///
/// Runs in a single pass, so a backslash produced for a quote is never
/// escaped again.
pub fn escape_script_string(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// How an outgoing message reaches a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    /// 1:1 chat, addressed by the other party's handle.
    Direct(&'a str),
    /// Group chat, addressed by its composite identifier.
    Chat(&'a str),
}

/// Pick the route for a chat with the given participants.
///
/// A group without a composite identifier is an error: sending to one of
/// its members instead would leak the message out of the group.
pub fn route<'a>(
    participants: &'a [String],
    chat_identifier: Option<&'a str>,
) -> Result<Route<'a>> {
    if let [only] = participants {
        return Ok(Route::Direct(only));
    }

    match chat_identifier.filter(|id| !id.is_empty()) {
        Some(id) => Ok(Route::Chat(id)),
        None => Err(BridgeError::Configuration(format!(
            "Missing chat_identifier for a chat with {} participants",
            participants.len()
        ))),
    }
}

pub fn recipient_script(handle: &str, text: &str) -> String {
    format!(
        "tell application \"Messages\"\n\
         \tsend \"{}\" to buddy \"{}\" of (service 1 whose service type is iMessage)\n\
         end tell",
        escape_script_string(text),
        escape_script_string(handle)
    )
}

pub fn chat_script(chat_identifier: &str, text: &str) -> String {
    format!(
        "tell application \"Messages\"\n\
         \tset targetChat to first chat whose id is \"{}\"\n\
         \tsend \"{}\" to targetChat\n\
         end tell",
        escape_script_string(chat_identifier),
        escape_script_string(text)
    )
}

/// Executes a generated automation script.
pub trait ScriptRunner {
    fn run(&self, script: &str) -> Result<()>;
}

/// Runs scripts with `osascript -e`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Osascript;

impl ScriptRunner for Osascript {
    fn run(&self, script: &str) -> Result<()> {
        let output = Command::new("osascript")
            .arg("-e")
            .arg(script)
            .output()
            .map_err(|e| BridgeError::Dispatch(format!("failed to spawn osascript: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("osascript exited with {}: {}", output.status, stderr.trim());
            return Err(BridgeError::Dispatch(format!(
                "osascript exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        info!("Message handed to Messages");
        Ok(())
    }
}
