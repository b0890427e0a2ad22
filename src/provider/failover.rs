//! Multi-provider failover
//!
//! A resilience decorator around an ordered list of completion providers.
//! When a provider rejects a step for a retryable reason (quota, rate
//! limit, transport), the next one is tried; when every provider has
//! failed the turn gets a terminal service-unavailable error rather than
//! a partial stream.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::{CompletionProvider, DeltaStream, StepRequest};
use crate::{Error, Result};

/// Ordered provider chain
pub struct FailoverProvider {
    providers: Vec<Arc<dyn CompletionProvider>>,
}

impl FailoverProvider {
    /// Build a chain from an ordered provider list
    #[must_use]
    pub fn new(providers: Vec<Arc<dyn CompletionProvider>>) -> Self {
        Self { providers }
    }
}

#[async_trait]
impl CompletionProvider for FailoverProvider {
    fn name(&self) -> &str {
        "failover"
    }

    async fn stream_step(&self, request: StepRequest) -> Result<DeltaStream> {
        for provider in &self.providers {
            match provider.stream_step(request.clone()).await {
                Ok(stream) => return Ok(stream),
                Err(e) if e.is_provider_retryable() => {
                    warn!(
                        provider = provider.name(),
                        error = %e,
                        "Provider failed, trying next"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Err(Error::ProvidersExhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{FinishReason, StreamDelta};
    use serde_json::Value;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyProvider {
        name: &'static str,
        fail: bool,
        calls: AtomicU32,
    }

    #[async_trait]
    impl CompletionProvider for FlakyProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn stream_step(&self, _request: StepRequest) -> Result<DeltaStream> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::ProviderQuota(format!("{} over quota", self.name)));
            }
            let stream = futures::stream::iter(vec![
                Ok(StreamDelta::Text("ok".to_string())),
                Ok(StreamDelta::Finish(FinishReason::Stop)),
            ]);
            Ok(Box::pin(stream))
        }
    }

    fn request() -> StepRequest {
        StepRequest {
            messages: Vec::new(),
            tools: Value::Array(Vec::new()),
        }
    }

    #[tokio::test]
    async fn falls_over_to_second_provider() {
        let first = Arc::new(FlakyProvider {
            name: "primary",
            fail: true,
            calls: AtomicU32::new(0),
        });
        let second = Arc::new(FlakyProvider {
            name: "secondary",
            fail: false,
            calls: AtomicU32::new(0),
        });
        let chain = FailoverProvider::new(vec![first.clone(), second.clone()]);

        let text = chain.complete_text(Vec::new()).await.unwrap();
        assert_eq!(text, "ok");
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn all_exhausted_yields_terminal_error() {
        let chain = FailoverProvider::new(vec![
            Arc::new(FlakyProvider {
                name: "a",
                fail: true,
                calls: AtomicU32::new(0),
            }),
            Arc::new(FlakyProvider {
                name: "b",
                fail: true,
                calls: AtomicU32::new(0),
            }),
        ]);

        let err = chain.stream_step(request()).await.err().unwrap();
        assert!(matches!(err, Error::ProvidersExhausted));
    }

    #[tokio::test]
    async fn empty_chain_is_exhausted() {
        let chain = FailoverProvider::new(Vec::new());
        let err = chain.stream_step(request()).await.err().unwrap();
        assert!(matches!(err, Error::ProvidersExhausted));
    }
}
