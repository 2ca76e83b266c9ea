use async_trait::async_trait;
use serde_json::Value;

/// The single normalized shape every inbound RPC callback result takes.
///
/// The specification describes a permissive, dynamically-typed callback
/// contract (a callback may return a bool, `None`, a pair, or a bare value).
/// Rust has no equivalent of that runtime polymorphism, so per the design
/// note in the specification this type collapses all of it: callbacks
/// implement [`Callback`] and return `CallbackResult` directly, and the
/// Responder never sees the ambiguity the original dynamic contract had.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CallbackResult {
    pub success: bool,
    pub data: Value,
}

impl CallbackResult {
    pub fn ok(data: Value) -> Self {
        Self { success: true, data }
    }

    pub fn ok_empty() -> Self {
        Self {
            success: true,
            data: Value::Null,
        }
    }

    pub fn fail() -> Self {
        Self {
            success: false,
            data: Value::Null,
        }
    }
}

impl From<bool> for CallbackResult {
    fn from(success: bool) -> Self {
        Self {
            success,
            data: Value::Null,
        }
    }
}

/// A handler registered with the [`crate::transport::Responder`] for one of
/// the inbound RPC endpoints.
#[async_trait]
pub trait Callback: Send + Sync {
    async fn call(&self, data: Value) -> CallbackResult;
}
