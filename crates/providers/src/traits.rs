use cg_domain::chat::{ChatRequest, ChatResponse, ProviderCapabilities};
use cg_domain::error::Result;

/// Trait that every LLM adapter must implement.
///
/// Implementations are provider-specific adapters (Anthropic, OpenAI-compat,
/// Google Gemini) that translate between the internal chat types and the
/// wire format of each provider's HTTP API.
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    /// Send a chat completion request and wait for the full response.
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse>;

    /// A unique identifier for this provider instance.
    fn name(&self) -> &str;

    /// The advertised capabilities of this provider.
    fn capabilities(&self) -> &ProviderCapabilities;
}
