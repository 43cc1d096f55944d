// LLM Provider Module
// Provides a unified interface for multiple LLM providers

pub mod conversation;
pub mod helpers;
pub mod loop_detector;
pub mod model_adapter;
pub mod provider;
pub mod provider_registry;
pub mod rate_limiter;
pub mod registry;

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "anthropic")]
pub mod anthropic;

#[cfg(feature = "gemini")]
pub mod gemini;

#[cfg(feature = "cohere")]
pub mod cohere;

#[cfg(test)]
mod tests;

// Re-export main types
pub use conversation::{Compressor, Conversation, CompressionSummary};
pub use helpers::*;
pub use loop_detector::{LoopAction, LoopDetection, LoopDetector, LoopDetectorConfig, LoopType};
pub use model_adapter::{
    adapter_for_model, classify_model_family, GenericAdapter, LlamaSmallAdapter, ModelAdapter,
    ModelFamily, ModelInfo, ParsedResponse, StrictnessHint,
};
pub use provider::*;
pub use provider_registry::{
    LegacyConfig, ModelInfo as RegistryModelInfo, ModelRegistry,
    ProviderConfig as RegistryProviderConfig, ProviderRegistry,
};
pub use rate_limiter::{ModelLimits, RateLimiter};
pub use registry::{not_found_message, ToolRegistry};

#[cfg(feature = "openai")]
pub use openai::OpenAIProvider;

#[cfg(feature = "anthropic")]
pub use anthropic::AnthropicProvider;

#[cfg(feature = "gemini")]
pub use gemini::GeminiProvider;

#[cfg(feature = "cohere")]
pub use cohere::CohereProvider;
