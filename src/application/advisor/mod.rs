mod cache;
mod gateway;
mod keys;
mod provider;
mod rate_limiter;
mod schema;
mod transport;

pub use cache::ResponseCache;
pub use gateway::{AdvisorGateway, GatewayConfig};
pub use keys::{KeyVaultError, MasterKey, ProviderKey};
pub use provider::{ProviderEndpoint, ProviderId};
pub use rate_limiter::CallBudget;
pub use schema::{
    AdvisorReport, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, Recommendation,
};
pub use transport::{AdvisorTransport, HttpTransport, ProviderRequest};
