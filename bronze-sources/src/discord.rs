//! Discord REST client for bronze chat extraction.
//!
//! Talks to the Discord v10 HTTP API with a bot token. Channels map to top-level
//! containers, public archived and active threads to sub-containers, and messages to
//! items with `content`, `created_at`, and `edited_at` payload fields.

use std::collections::BTreeMap;
use std::sync::Mutex;

use bronze_config::shared::DiscordConfig;
use bronze_etl::error::EtlResult;
use bronze_etl::source::{Cursor, ItemPage, SourceClient, SourceItem, ThreadListing};
use bronze_etl::types::{ContainerRef, ScalarValue};
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::info;

use crate::http::get_json;

const API_BASE: &str = "https://discord.com/api/v10";

/// Discord channel type for guild text channels.
const CHANNEL_TYPE_TEXT: u8 = 0;

/// Messages fetched per page, the API maximum.
const MESSAGE_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    username: String,
    global_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GuildResponse {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ChannelResponse {
    id: String,
    #[serde(rename = "type")]
    kind: u8,
    name: Option<String>,
    #[serde(default)]
    position: i64,
    parent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ThreadsResponse {
    threads: Vec<ChannelResponse>,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    id: String,
    author: UserResponse,
    #[serde(default)]
    content: String,
    timestamp: String,
    edited_timestamp: Option<String>,
}

/// [`SourceClient`] over the Discord REST API.
///
/// The guild resolved by [`SourceClient::open`] is cached for the lifetime of the
/// session and cleared by [`SourceClient::close`].
pub struct DiscordClient {
    http: reqwest::Client,
    bot_token: SecretString,
    guild_id: String,
    base_url: String,
    guild: Mutex<Option<GuildResponse>>,
}

impl DiscordClient {
    pub fn new(config: &DiscordConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            bot_token: config.bot_token.clone(),
            guild_id: config.guild_id.clone(),
            base_url: API_BASE.to_string(),
            guild: Mutex::new(None),
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .get(format!("{}{path}", self.base_url))
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bot {}", self.bot_token.expose_secret()),
            )
    }

    fn guild_name(&self) -> Option<String> {
        self.guild
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|guild| guild.name.clone()))
    }
}

impl SourceClient for DiscordClient {
    fn name() -> &'static str {
        "discord"
    }

    async fn open(&self) -> EtlResult<()> {
        let user: UserResponse = get_json(self.get("/users/@me"), "get current user").await?;
        info!(bot = %user.username, "authenticated with discord");

        let guild: GuildResponse = get_json(
            self.get(&format!("/guilds/{}", self.guild_id)),
            "resolve guild",
        )
        .await?;
        info!(guild = %guild.name, guild_id = %guild.id, "resolved guild");

        if let Ok(mut guard) = self.guild.lock() {
            *guard = Some(guild);
        }

        Ok(())
    }

    async fn close(&self) -> EtlResult<()> {
        if let Ok(mut guard) = self.guild.lock() {
            *guard = None;
        }

        Ok(())
    }

    async fn list_containers(&self) -> EtlResult<Vec<ContainerRef>> {
        let channels: Vec<ChannelResponse> = get_json(
            self.get(&format!("/guilds/{}/channels", self.guild_id)),
            "list channels",
        )
        .await?;

        let mut text_channels: Vec<ChannelResponse> = channels
            .into_iter()
            .filter(|channel| channel.kind == CHANNEL_TYPE_TEXT)
            .collect();
        text_channels.sort_by_key(|channel| channel.position);

        if let Some(guild) = self.guild_name() {
            info!(
                guild = %guild,
                channels = text_channels.len(),
                "listed text channels"
            );
        }

        Ok(text_channels.into_iter().map(container_from).collect())
    }

    async fn list_threads(&self, channel: &ContainerRef) -> EtlResult<ThreadListing> {
        let archived: ThreadsResponse = get_json(
            self.get(&format!("/channels/{}/threads/archived/public", channel.id)),
            "list archived threads",
        )
        .await?;

        let active: ThreadsResponse = get_json(
            self.get(&format!("/guilds/{}/threads/active", self.guild_id)),
            "list active threads",
        )
        .await?;

        Ok(ThreadListing {
            archived: archived.threads.into_iter().map(container_from).collect(),
            active: active
                .threads
                .into_iter()
                .filter(|thread| thread.parent_id.as_deref() == Some(channel.id.as_str()))
                .map(container_from)
                .collect(),
        })
    }

    async fn list_items(
        &self,
        container: &ContainerRef,
        cursor: Option<&Cursor>,
    ) -> EtlResult<ItemPage> {
        let mut path = format!(
            "/channels/{}/messages?limit={MESSAGE_PAGE_SIZE}",
            container.id
        );
        if let Some(cursor) = cursor {
            path.push_str(&format!("&before={}", cursor.as_str()));
        }

        let messages: Vec<MessageResponse> = get_json(self.get(&path), "list messages").await?;

        Ok(page_from_messages(messages))
    }
}

fn container_from(channel: ChannelResponse) -> ContainerRef {
    let name = channel.name.unwrap_or_default();
    ContainerRef::new(channel.id, name)
}

/// Converts one page of messages, computing the cursor for the page after it.
///
/// Discord returns messages newest first; a full page continues with `before` set to
/// the last (oldest) message id, a short page ends the traversal.
fn page_from_messages(messages: Vec<MessageResponse>) -> ItemPage {
    let next = (messages.len() == MESSAGE_PAGE_SIZE)
        .then(|| messages.last().map(|message| Cursor::new(message.id.clone())))
        .flatten();

    let items = messages.into_iter().map(item_from_message).collect();

    ItemPage { items, next }
}

fn item_from_message(message: MessageResponse) -> SourceItem {
    let mut payload = BTreeMap::new();
    payload.insert(
        "content".to_string(),
        ScalarValue::Text(message.content),
    );
    payload.insert(
        "created_at".to_string(),
        ScalarValue::from(parse_timestamp(Some(&message.timestamp))),
    );
    payload.insert(
        "edited_at".to_string(),
        ScalarValue::from(parse_timestamp(message.edited_timestamp.as_deref())),
    );

    let author_display = message
        .author
        .global_name
        .unwrap_or(message.author.username);

    SourceItem {
        id: message.id,
        author_id: Some(message.author.id),
        author_display: Some(author_display),
        payload,
    }
}

/// Parses an ISO-8601 timestamp, treating malformed values as absent.
fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|ts| ts.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: &str) -> MessageResponse {
        MessageResponse {
            id: id.to_string(),
            author: UserResponse {
                id: "u1".to_string(),
                username: "darcy".to_string(),
                global_name: Some("Darcy".to_string()),
            },
            content: "hello".to_string(),
            timestamp: "2024-05-01T12:00:00+00:00".to_string(),
            edited_timestamp: None,
        }
    }

    #[test]
    fn short_page_ends_the_traversal() {
        let page = page_from_messages(vec![message("9"), message("8")]);

        assert_eq!(page.items.len(), 2);
        assert_eq!(page.next, None);
    }

    #[test]
    fn full_page_continues_before_the_oldest_message() {
        let messages: Vec<_> = (0..MESSAGE_PAGE_SIZE)
            .rev()
            .map(|n| message(&n.to_string()))
            .collect();

        let page = page_from_messages(messages);

        assert_eq!(page.next, Some(Cursor::new("0")));
    }

    #[test]
    fn message_payload_carries_content_and_timestamps() {
        let item = item_from_message(message("9"));

        assert_eq!(item.author_display.as_deref(), Some("Darcy"));
        assert_eq!(
            item.payload.get("content"),
            Some(&ScalarValue::Text("hello".to_string()))
        );
        assert!(matches!(
            item.payload.get("created_at"),
            Some(ScalarValue::Timestamp(_))
        ));
        assert_eq!(item.payload.get("edited_at"), Some(&ScalarValue::Null));
    }

    #[test]
    fn malformed_timestamps_become_null() {
        assert_eq!(parse_timestamp(Some("not-a-timestamp")), None);
    }
}
