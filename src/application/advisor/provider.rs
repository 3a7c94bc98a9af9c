use crate::application::advisor::keys::ProviderKey;

/// Advisory providers speaking the chat-completion wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    Requesty,
    Deepseek,
    Openrouter,
    Openai,
}

impl ProviderId {
    /// Default failover order, highest priority first.
    pub const DEFAULT_PRIORITY: [ProviderId; 4] = [
        ProviderId::Requesty,
        ProviderId::Deepseek,
        ProviderId::Openrouter,
        ProviderId::Openai,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Requesty => "requesty",
            ProviderId::Deepseek => "deepseek",
            ProviderId::Openrouter => "openrouter",
            ProviderId::Openai => "openai",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderId::Requesty => "https://router.requesty.ai/v1",
            ProviderId::Deepseek => "https://api.deepseek.com/v1",
            ProviderId::Openrouter => "https://openrouter.ai/api/v1",
            ProviderId::Openai => "https://api.openai.com/v1",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderId::Requesty => "openai/gpt-4o-mini",
            ProviderId::Deepseek => "deepseek-chat",
            ProviderId::Openrouter => "openai/gpt-4o",
            ProviderId::Openai => "gpt-4o",
        }
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ProviderId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "requesty" => Ok(ProviderId::Requesty),
            "deepseek" => Ok(ProviderId::Deepseek),
            "openrouter" => Ok(ProviderId::Openrouter),
            "openai" => Ok(ProviderId::Openai),
            _ => anyhow::bail!(
                "Unknown advisory provider: {}. Must be one of requesty, deepseek, openrouter, openai",
                s
            ),
        }
    }
}

/// One configured provider: base URL, model and its pool of credentials.
pub struct ProviderEndpoint {
    pub id: ProviderId,
    pub base_url: String,
    pub model: String,
    pub keys: Vec<ProviderKey>,
}

impl ProviderEndpoint {
    pub fn new(id: ProviderId, keys: Vec<ProviderKey>) -> Self {
        Self {
            id,
            base_url: id.default_base_url().to_string(),
            model: id.default_model().to_string(),
            keys,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}
