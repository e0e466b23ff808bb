use std::time::Duration;

use anyhow::{bail, Result};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::USER_AGENT;
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_ENDPOINT: &str =
    "https://devapi.sociocircle.org/glimps/philosophy/684ee90a-6498-4c58-a425-bdbe93886eb7";
pub const DEFAULT_MEDIA_BASE: &str = "https://cdn.sociocircle.org/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub avatar_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub video_url: String,
    pub thumbnail_url: String,
    pub description: Option<String>,
    pub likes: i64,
    pub comments: i64,
    pub author: Author,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pagination {
    pub next_cursor: Option<String>,
    pub has_next: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeedPage {
    pub posts: Vec<Post>,
    pub pagination: Pagination,
}

impl FeedPage {
    /// The "nothing more to load" shape.
    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("feed request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("feed request returned status {status}")]
    Status { status: u16 },
    #[error("feed response could not be decoded: {0}")]
    Decode(#[source] serde_json::Error),
}

pub trait FeedSource: Send + Sync {
    fn fetch_page(&self, cursor: Option<&str>) -> Result<FeedPage, FeedError>;
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub endpoint: String,
    pub media_base_url: String,
    pub user_agent: String,
    pub request_timeout: Option<Duration>,
    pub http_client: Option<HttpClient>,
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    endpoint: Url,
    media_base: String,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("feed client user agent required");
        }
        let endpoint = if config.endpoint.trim().is_empty() {
            DEFAULT_ENDPOINT
        } else {
            config.endpoint.trim()
        };
        let endpoint = Url::parse(endpoint)?;
        let media_base = if config.media_base_url.trim().is_empty() {
            DEFAULT_MEDIA_BASE.to_string()
        } else {
            config.media_base_url.trim().to_string()
        };

        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.request_timeout)
                .build()?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            endpoint,
            media_base,
        })
    }

    pub fn page_url(&self, cursor: Option<&str>) -> Url {
        let mut url = self.endpoint.clone();
        if let Some(cursor) = cursor {
            url.query_pairs_mut().append_pair("cursor", cursor);
        }
        url
    }
}

impl FeedSource for Client {
    fn fetch_page(&self, cursor: Option<&str>) -> Result<FeedPage, FeedError> {
        let url = self.page_url(cursor);
        tracing::debug!(%url, "fetching feed page");

        let response = self
            .http
            .get(url.clone())
            .header(USER_AGENT, &self.user_agent)
            .send()
            .map_err(|err| {
                tracing::warn!(%url, error = %err, "feed request failed");
                FeedError::Transport(err)
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%url, status = status.as_u16(), "feed request rejected");
            return Err(FeedError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().map_err(FeedError::Transport)?;
        let page = decode_page(&body, &self.media_base).map_err(|err| {
            tracing::warn!(%url, error = %err, "feed response malformed");
            err
        })?;
        tracing::debug!(
            posts = page.posts.len(),
            has_next = page.pagination.has_next,
            "feed page loaded"
        );
        Ok(page)
    }
}

#[derive(Debug, Default, Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Option<Body>,
}

#[derive(Debug, Default, Deserialize)]
struct Body {
    #[serde(default)]
    list: Option<Vec<Record>>,
    #[serde(default)]
    pagination: Option<WirePagination>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePagination {
    #[serde(default)]
    next_cursor: Option<String>,
    #[serde(default)]
    has_next: bool,
}

/// Every field but `id` may be missing or `null`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Record {
    id: String,
    #[serde(default)]
    content_url: Option<String>,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    total_likes: Option<i64>,
    #[serde(default)]
    total_comments: Option<i64>,
    #[serde(default)]
    org_name: Option<String>,
    #[serde(default)]
    org_image: Option<String>,
}

impl Record {
    fn into_post(self, media_base: &str) -> Post {
        Post {
            id: self.id,
            video_url: resolve_media(media_base, &self.content_url.unwrap_or_default()),
            thumbnail_url: resolve_media(media_base, &self.thumbnail.unwrap_or_default()),
            description: self.description,
            likes: self.total_likes.unwrap_or_default(),
            comments: self.total_comments.unwrap_or_default(),
            author: Author {
                name: self.org_name.unwrap_or_default(),
                avatar_url: resolve_media(media_base, &self.org_image.unwrap_or_default()),
            },
        }
    }
}

pub fn decode_page(body: &[u8], media_base: &str) -> Result<FeedPage, FeedError> {
    let envelope: Envelope = serde_json::from_slice(body).map_err(FeedError::Decode)?;
    let data = envelope.data.unwrap_or_default();
    let pagination = data
        .pagination
        .map(|wire| Pagination {
            next_cursor: wire.next_cursor,
            has_next: wire.has_next,
        })
        .unwrap_or_default();
    let posts = data
        .list
        .unwrap_or_default()
        .into_iter()
        .map(|record| record.into_post(media_base))
        .collect();
    Ok(FeedPage { posts, pagination })
}

/// Media fields arrive as host-relative paths; absolute URLs pass through.
pub fn resolve_media(base: &str, path: &str) -> String {
    let path = path.trim();
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!("{base}{path}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://cdn.test/";

    #[test]
    fn maps_wire_records_to_posts() {
        let body = br#"{
            "data": {
                "list": [{
                    "id": "r1",
                    "contentUrl": "videos/r1.mp4",
                    "thumbnail": "thumbs/r1.jpg",
                    "description": "hello",
                    "totalLikes": 12,
                    "totalComments": 3,
                    "orgName": "Stoa",
                    "orgImage": "orgs/stoa.png"
                }],
                "pagination": {"nextCursor": "c1", "hasNext": true}
            }
        }"#;
        let page = decode_page(body, BASE).unwrap();
        assert_eq!(page.pagination.next_cursor.as_deref(), Some("c1"));
        assert!(page.pagination.has_next);
        let post = &page.posts[0];
        assert_eq!(post.video_url, "https://cdn.test/videos/r1.mp4");
        assert_eq!(post.thumbnail_url, "https://cdn.test/thumbs/r1.jpg");
        assert_eq!(post.author.avatar_url, "https://cdn.test/orgs/stoa.png");
        assert_eq!(post.author.name, "Stoa");
        assert_eq!(post.likes, 12);
        assert_eq!(post.comments, 3);
        assert_eq!(post.description.as_deref(), Some("hello"));
    }

    #[test]
    fn missing_sections_mean_no_more_pages() {
        let page = decode_page(br#"{"data": {}}"#, BASE).unwrap();
        assert_eq!(page, FeedPage::empty());
        let page = decode_page(br#"{}"#, BASE).unwrap();
        assert!(!page.pagination.has_next);
    }

    #[test]
    fn null_description_is_kept_absent() {
        let body = br#"{"data": {"list": [{"id": "x", "description": null}],
            "pagination": {"nextCursor": null, "hasNext": false}}}"#;
        let page = decode_page(body, BASE).unwrap();
        assert_eq!(page.posts[0].description, None);
        assert_eq!(page.posts[0].likes, 0);
    }

    #[test]
    fn null_fields_in_one_record_do_not_fail_the_page() {
        let body = br#"{"data": {"list": [
            {"id": "a", "totalLikes": null, "totalComments": null, "orgName": null,
             "contentUrl": null, "thumbnail": null, "orgImage": null},
            {"id": "b", "totalLikes": 7, "orgName": "Stoa", "contentUrl": "b.mp4"}
        ], "pagination": {"nextCursor": "c2", "hasNext": true}}}"#;
        let page = decode_page(body, BASE).unwrap();
        assert_eq!(page.posts.len(), 2);
        assert_eq!(page.posts[0].likes, 0);
        assert_eq!(page.posts[0].comments, 0);
        assert_eq!(page.posts[0].author.name, "");
        assert_eq!(page.posts[0].video_url, BASE);
        assert_eq!(page.posts[1].likes, 7);
        assert_eq!(page.posts[1].video_url, "https://cdn.test/b.mp4");
        assert!(page.pagination.has_next);
    }

    #[test]
    fn malformed_body_is_a_decode_error() {
        let err = decode_page(b"<html>oops</html>", BASE).unwrap_err();
        assert!(matches!(err, FeedError::Decode(_)));
    }

    #[test]
    fn absolute_media_urls_pass_through() {
        assert_eq!(
            resolve_media(BASE, "https://elsewhere.test/a.mp4"),
            "https://elsewhere.test/a.mp4"
        );
        assert_eq!(resolve_media(BASE, "a.mp4"), "https://cdn.test/a.mp4");
    }

    #[test]
    fn cursor_becomes_a_query_parameter() {
        let client = Client::new(ClientConfig {
            endpoint: "https://api.test/feed?kind=reels".into(),
            user_agent: "test".into(),
            ..ClientConfig::default()
        })
        .unwrap();
        assert_eq!(
            client.page_url(None).as_str(),
            "https://api.test/feed?kind=reels"
        );
        assert_eq!(
            client.page_url(Some("c 1")).as_str(),
            "https://api.test/feed?kind=reels&cursor=c+1"
        );
    }

    #[test]
    fn user_agent_is_required() {
        assert!(Client::new(ClientConfig::default()).is_err());
    }
}
