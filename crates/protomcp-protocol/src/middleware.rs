//! Middleware pipeline: outermost-first on entry, innermost-first on exit.
//!
//! Built once at construction time as a `Vec<Arc<dyn Middleware>>` and
//! driven by recursive `next` closures rather than `tower::Service`, since
//! the pipeline must run uniformly over both directions (outgoing calls
//! this engine makes, incoming calls it serves) and several method-class
//! variants, which would otherwise mean threading distinct `Service`
//! stacks through `Protocol`'s already-generic-free public API.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::RequestContext;
use crate::error::ProtocolResult;

/// One call through the middleware pipeline: method name, params, and the
/// context of the request being processed.
pub struct MiddlewareRequest {
    /// The method being invoked (request or notification name).
    pub method: String,
    /// The call's parameters, mutable so middleware can rewrite them.
    pub params: Option<Value>,
    /// The context of the in-flight request this call belongs to.
    pub ctx: RequestContext,
}

/// The remaining pipeline, invoked by a [`Middleware`] to continue the
/// chain. Calling `next` more than once or not at all is how a middleware
/// short-circuits.
pub type Next<'a> = Box<dyn FnOnce(MiddlewareRequest) -> futures::future::BoxFuture<'a, ProtocolResult<Value>> + Send + 'a>;

/// A single link in the pipeline. Implementations may inspect or mutate
/// `req`, call `next` to continue, or return without calling it to
/// short-circuit.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Process `req`, optionally delegating to `next`.
    async fn handle<'a>(&'a self, req: MiddlewareRequest, next: Next<'a>) -> ProtocolResult<Value>;
}

/// Which class of call a specialized pipeline applies to, per §4.2's
/// "method-class specialized pipelines".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodClass {
    /// `tools/call`.
    ToolCall,
    /// `resources/read`.
    ResourceRead,
    /// `sampling/createMessage`.
    Sampling,
    /// `elicitation/create`.
    Elicitation,
    /// `prompts/get`.
    Prompt,
}

impl MethodClass {
    /// Classify a method name, if it belongs to one of the specialized
    /// classes.
    #[must_use]
    pub fn classify(method: &str) -> Option<Self> {
        match method {
            "tools/call" => Some(Self::ToolCall),
            "resources/read" => Some(Self::ResourceRead),
            "sampling/createMessage" => Some(Self::Sampling),
            "elicitation/create" => Some(Self::Elicitation),
            "prompts/get" => Some(Self::Prompt),
            _ => None,
        }
    }
}

/// An ordered, immutable-after-construction middleware chain.
#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Arc<Vec<Arc<dyn Middleware>>>,
}

impl Pipeline {
    /// Build a pipeline from an ordered list of middleware, outermost
    /// first.
    #[must_use]
    pub fn new(stages: Vec<Arc<dyn Middleware>>) -> Self {
        Self {
            stages: Arc::new(stages),
        }
    }

    /// `true` if no middleware is registered; callers may skip the
    /// recursion entirely.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run `req` through every stage, then `terminal` (the handler or the
    /// outbound send), and return its result.
    pub async fn run<T>(&self, req: MiddlewareRequest, terminal: T) -> ProtocolResult<Value>
    where
        T: FnOnce(MiddlewareRequest) -> futures::future::BoxFuture<'static, ProtocolResult<Value>> + Send + 'static,
    {
        Self::run_from(self.stages.clone(), 0, req, Box::new(terminal)).await
    }

    fn run_from(
        stages: Arc<Vec<Arc<dyn Middleware>>>,
        index: usize,
        req: MiddlewareRequest,
        terminal: Next<'static>,
    ) -> futures::future::BoxFuture<'static, ProtocolResult<Value>> {
        Box::pin(async move {
            match stages.get(index) {
                Some(stage) => {
                    let stage = Arc::clone(stage);
                    let rest = stages.clone();
                    let next: Next<'static> = Box::new(move |req| Self::run_from(rest, index + 1, req, terminal));
                    stage.handle(req, next).await
                }
                None => terminal(req).await,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protomcp_types::RequestId;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_util::sync::CancellationToken;

    struct OrderRecorder {
        log: Arc<std::sync::Mutex<Vec<&'static str>>>,
        label: &'static str,
    }

    #[async_trait]
    impl Middleware for OrderRecorder {
        async fn handle<'a>(&'a self, req: MiddlewareRequest, next: Next<'a>) -> ProtocolResult<Value> {
            self.log.lock().unwrap().push(self.label);
            let result = next(req).await;
            self.log.lock().unwrap().push(self.label);
            result
        }
    }

    fn test_ctx() -> RequestContext {
        struct NoopPeer;
        #[async_trait]
        impl crate::context::PeerHandle for NoopPeer {
            async fn send_request(&self, _: &str, _: Option<Value>, _: RequestId) -> ProtocolResult<Value> {
                unreachable!()
            }
            async fn send_notification(&self, _: &str, _: Option<Value>) -> ProtocolResult<()> {
                unreachable!()
            }
        }
        RequestContext::new(
            Some(RequestId::Number(1)),
            CancellationToken::new(),
            None,
            None,
            Arc::new(Default::default()),
            Arc::new(NoopPeer),
        )
    }

    #[tokio::test]
    async fn runs_outermost_first_on_entry_innermost_first_on_exit() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(vec![
            Arc::new(OrderRecorder { log: log.clone(), label: "outer" }),
            Arc::new(OrderRecorder { log: log.clone(), label: "inner" }),
        ]);

        let req = MiddlewareRequest {
            method: "ping".to_string(),
            params: None,
            ctx: test_ctx(),
        };
        let atomic = AtomicUsize::new(0);
        let result = pipeline
            .run(req, move |_| {
                atomic.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Ok(Value::Null) })
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(*log.lock().unwrap(), vec!["outer", "inner", "inner", "outer"]);
    }

    #[test]
    fn classifies_known_method_classes() {
        assert_eq!(MethodClass::classify("tools/call"), Some(MethodClass::ToolCall));
        assert_eq!(MethodClass::classify("unknown/method"), None);
    }
}
