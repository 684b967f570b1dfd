//! Notion REST client for bronze workspace-user extraction.
//!
//! The users endpoint is workspace-global, so the client exposes a single synthetic
//! container and no sub-containers. Items carry `name`, `email`, and `user_type`.

use std::collections::BTreeMap;

use bronze_config::shared::NotionConfig;
use bronze_etl::error::EtlResult;
use bronze_etl::source::{Cursor, ItemPage, SourceClient, SourceItem, ThreadListing};
use bronze_etl::types::{ContainerRef, ScalarValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::info;

use crate::http::get_json;

const API_BASE: &str = "https://api.notion.com";

const NOTION_VERSION: &str = "2022-06-28";

/// Users fetched per page, the API maximum.
const USER_PAGE_SIZE: usize = 100;

/// Id and name of the synthetic container all user rows land under.
const WORKSPACE_CONTAINER: &str = "workspace-users";

#[derive(Debug, Deserialize)]
struct PersonResponse {
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    person: Option<PersonResponse>,
}

#[derive(Debug, Deserialize)]
struct UserListResponse {
    results: Vec<UserResponse>,
    has_more: bool,
    next_cursor: Option<String>,
}

/// [`SourceClient`] over the Notion REST API.
pub struct NotionClient {
    http: reqwest::Client,
    api_key: SecretString,
    base_url: String,
}

impl NotionClient {
    pub fn new(config: &NotionConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            base_url: API_BASE.to_string(),
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .header("Notion-Version", NOTION_VERSION)
    }
}

impl SourceClient for NotionClient {
    fn name() -> &'static str {
        "notion"
    }

    async fn open(&self) -> EtlResult<()> {
        let bot: UserResponse = get_json(self.get("/v1/users/me"), "get integration user").await?;
        info!(integration = %bot.name.as_deref().unwrap_or("unknown"), "authenticated with notion");

        Ok(())
    }

    async fn close(&self) -> EtlResult<()> {
        Ok(())
    }

    async fn list_containers(&self) -> EtlResult<Vec<ContainerRef>> {
        Ok(vec![ContainerRef::new(
            WORKSPACE_CONTAINER,
            WORKSPACE_CONTAINER,
        )])
    }

    async fn list_threads(&self, _channel: &ContainerRef) -> EtlResult<ThreadListing> {
        Ok(ThreadListing::default())
    }

    async fn list_items(
        &self,
        _container: &ContainerRef,
        cursor: Option<&Cursor>,
    ) -> EtlResult<ItemPage> {
        let mut path = format!("/v1/users?page_size={USER_PAGE_SIZE}");
        if let Some(cursor) = cursor {
            path.push_str(&format!("&start_cursor={}", cursor.as_str()));
        }

        let page: UserListResponse = get_json(self.get(&path), "list users").await?;

        Ok(page_from_users(page))
    }
}

fn page_from_users(page: UserListResponse) -> ItemPage {
    let next = page
        .has_more
        .then_some(page.next_cursor)
        .flatten()
        .map(Cursor::new);

    let items = page.results.into_iter().map(item_from_user).collect();

    ItemPage { items, next }
}

fn item_from_user(user: UserResponse) -> SourceItem {
    let mut payload = BTreeMap::new();
    payload.insert("name".to_string(), ScalarValue::from(user.name.clone()));
    payload.insert(
        "email".to_string(),
        ScalarValue::from(user.person.and_then(|person| person.email)),
    );
    payload.insert("user_type".to_string(), ScalarValue::from(user.kind));

    SourceItem {
        id: user.id,
        author_id: None,
        author_display: user.name,
        payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, email: Option<&str>) -> UserResponse {
        UserResponse {
            id: id.to_string(),
            name: Some("Jess".to_string()),
            kind: Some("person".to_string()),
            person: email.map(|email| PersonResponse {
                email: Some(email.to_string()),
            }),
        }
    }

    #[test]
    fn exhausted_listing_has_no_cursor() {
        let page = page_from_users(UserListResponse {
            results: vec![user("u1", Some("jess@example.com"))],
            has_more: false,
            next_cursor: None,
        });

        assert_eq!(page.items.len(), 1);
        assert_eq!(page.next, None);
    }

    #[test]
    fn continued_listing_carries_the_next_cursor() {
        let page = page_from_users(UserListResponse {
            results: vec![user("u1", None)],
            has_more: true,
            next_cursor: Some("abc".to_string()),
        });

        assert_eq!(page.next, Some(Cursor::new("abc")));
    }

    #[test]
    fn bot_users_have_a_null_email() {
        let item = item_from_user(user("u2", None));

        assert_eq!(item.payload.get("email"), Some(&ScalarValue::Null));
        assert_eq!(
            item.payload.get("user_type"),
            Some(&ScalarValue::Text("person".to_string()))
        );
        assert_eq!(item.author_display.as_deref(), Some("Jess"));
    }
}
