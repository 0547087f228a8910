use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use weave_types::ToolSchema;

use crate::{ChatMessage, ChunkStream, ProviderRegistry};

/// Context-aware streaming seam the execution layers depend on; the provider
/// registry is the production implementation, tests script their own.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn stream(
        &self,
        provider_hint: Option<&str>,
        model_hint: Option<&str>,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolSchema>>,
        cancel: CancellationToken,
    ) -> anyhow::Result<ChunkStream>;
}

#[async_trait]
impl LlmClient for ProviderRegistry {
    async fn stream(
        &self,
        provider_hint: Option<&str>,
        model_hint: Option<&str>,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolSchema>>,
        cancel: CancellationToken,
    ) -> anyhow::Result<ChunkStream> {
        self.stream_for_provider(provider_hint, model_hint, messages, tools, cancel)
            .await
    }
}
