use std::collections::HashMap;

use serde_json::Value;

use super::error::Result;

/// Successful outcome of an invocation.
///
/// Failures travel as [`TetherError`](super::error::TetherError) in the `Err` arm of [`InvokeResult`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RpcResult {
    /// Reply payload; `None` for one-way and callback calls.
    pub value: Option<Value>,
    pub attachments: HashMap<String, String>,
    /// Set when the reply will be delivered to the invocation's callback.
    pub pending_callback: bool,
}

impl RpcResult {
    pub fn new(value: Value) -> Self {
        Self {
            value: Some(value),
            ..Default::default()
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn pending() -> Self {
        Self {
            pending_callback: true,
            ..Default::default()
        }
    }

    pub fn with_attachment(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attachments.insert(key.into(), value.into());
        self
    }
}

pub type InvokeResult = Result<RpcResult>;
