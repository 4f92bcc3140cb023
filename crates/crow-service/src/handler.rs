//! The pluggable unit of user code a service exposes under a namespace
//! (spec §1: "user-provided handler functions themselves" are an
//! external collaborator — this trait is their contract).

use async_trait::async_trait;
use crow_wire::Value;

/// What a handler produces for one `RemoteCall`.
pub enum Outcome {
    /// Becomes a single `CallResult`.
    Unary(Value),
    /// Becomes `SequentialItemStart` .. `SequentialItem`* .. `SequentialItemEnd`.
    Stream(Vec<Value>),
}

/// A handler-raised failure, wired onto the wire as `CallException`
/// (spec §4.1, §7 remote-exception).
#[derive(Debug, Clone)]
pub struct HandlerFailure {
    pub kind: String,
    pub stack_trace: String,
}

impl HandlerFailure {
    pub fn new(kind: impl Into<String>, stack_trace: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            stack_trace: stack_trace.into(),
        }
    }
}

#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, fn_name: &str, args: Value) -> Result<Outcome, HandlerFailure>;
}
