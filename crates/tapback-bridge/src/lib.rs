/// Conversation bridge over a local snapshot of the Messages store.
///
/// Reads produce typed chat summaries and message records; sends go out
/// through the Messages app via AppleScript.

pub mod bridge;
pub mod classify;
pub mod contacts;
pub mod error;
pub mod send;

pub use bridge::{Bridge, BridgeConfig, Conversation};
pub use classify::{classify, decode_row};
pub use contacts::{
    AuthorizationStatus, Contact, ContactIndex, ContactStore, JsonContactStore, NameResolver,
    NoContacts,
};
pub use error::{BridgeError, Result};
pub use send::{Osascript, Route, ScriptRunner, escape_script_string, route};
