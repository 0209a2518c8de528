use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use super::error::Result;
use crate::constants::ASYNC_KEY;

/// Caller-provided destination for a synchronous reply.
///
/// Clones share the same slot, so the caller keeps one handle and passes
/// another along with the invocation.
#[derive(Debug, Clone, Default)]
pub struct ReplySlot(Arc<Mutex<Option<Value>>>);

impl ReplySlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, value: Value) {
        *self.0.lock() = Some(value);
    }

    pub fn get(&self) -> Option<Value> {
        self.0.lock().clone()
    }

    pub fn take(&self) -> Option<Value> {
        self.0.lock().take()
    }
}

/// Completion callback for asynchronous invocations.
pub type ReplyCallback = Arc<dyn Fn(Result<Value>) + Send + Sync>;

/// One logical call: method, arguments and attachments.
///
/// Invocations are read-only once built and may be shared across retries.
#[derive(Clone)]
pub struct Invocation {
    method_name: String,
    arguments: Vec<Value>,
    attachments: HashMap<String, String>,
    reply: Option<ReplySlot>,
    callback: Option<ReplyCallback>,
}

impl Invocation {
    pub fn new(method_name: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self {
            method_name: method_name.into(),
            arguments,
            attachments: HashMap::new(),
            reply: None,
            callback: None,
        }
    }

    pub fn with_attachment(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attachments.insert(key.into(), value.into());
        self
    }

    pub fn with_reply(mut self, reply: ReplySlot) -> Self {
        self.reply = Some(reply);
        self
    }

    pub fn with_callback(mut self, callback: ReplyCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    pub fn attachments(&self) -> &HashMap<String, String> {
        &self.attachments
    }

    pub fn attachment(&self, key: &str) -> Option<&str> {
        self.attachments.get(key).map(String::as_str)
    }

    pub fn reply(&self) -> Option<&ReplySlot> {
        self.reply.as_ref()
    }

    pub fn callback(&self) -> Option<&ReplyCallback> {
        self.callback.as_ref()
    }

    /// Whether the `async` attachment asks for a non-blocking call.
    ///
    /// A value that is not a boolean is logged and treated as `false`.
    pub fn is_async(&self) -> bool {
        match self.attachment(ASYNC_KEY) {
            None => false,
            Some(raw) => match raw.trim().parse::<bool>() {
                Ok(flag) => flag,
                Err(_) => {
                    tracing::error!(
                        "Invalid '{}' attachment '{}' on method {}",
                        ASYNC_KEY,
                        raw,
                        self.method_name
                    );
                    false
                }
            },
        }
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("method_name", &self.method_name)
            .field("arguments", &self.arguments)
            .field("attachments", &self.attachments)
            .field("has_reply", &self.reply.is_some())
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}
