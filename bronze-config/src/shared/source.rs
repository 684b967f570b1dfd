use secrecy::SecretString;
use serde::Deserialize;

/// Credentials and scope for the Discord chat source.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    /// Bot token used for the `Authorization: Bot ...` header.
    pub bot_token: SecretString,
    /// Guild (server) whose channels are extracted.
    pub guild_id: String,
}

/// Credentials for the Notion workspace source.
#[derive(Debug, Clone, Deserialize)]
pub struct NotionConfig {
    /// Internal integration token.
    pub api_key: SecretString,
}
