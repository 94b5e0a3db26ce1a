
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Clone)]
pub struct ApiResponse {
    pub posts: ApiPosts,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiPosts {
    #[serde(default)]
    pub items: Vec<PostItem>,
}

/// a single post of the channel feed
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PostItem {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    /// unix timestamp
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default)]
    pub published_at: i64,
    #[serde(default)]
    pub media: Vec<Media>,
    #[serde(default)]
    pub contents: Vec<Content>,

    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub sort: String,

    #[serde(default)]
    pub comment_count: u32,
    #[serde(default)]
    pub like_count: u32,
    #[serde(default)]
    pub share_count: u32,
    #[serde(default)]
    pub publish_to: i64,

    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub liked: bool,
    #[serde(default)]
    pub commentable: bool,
    #[serde(default)]
    pub adult_only: bool,
    #[serde(default)]
    pub is_manager: bool,
    #[serde(default)]
    pub unlisted: bool,
}

impl PostItem {
    /// the menu image is always the first attachment
    pub fn menu_image_url(&self) -> Option<&str> {
        self.media.first().and_then(Media::best_url)
    }
}

/// image attached to a post, every variant is a different resolution
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct Media {
    #[serde(default)]
    pub id: u64,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub mimetype: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub avg: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,

    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub small_url: String,
    #[serde(default)]
    pub medium_url: String,
    #[serde(default)]
    pub large_url: String,
    #[serde(default)]
    pub xlarge_url: String,
}

impl Media {
    /// the largest variant that is actually set
    pub fn best_url(&self) -> Option<&str> {
        [
            &self.xlarge_url,
            &self.large_url,
            &self.medium_url,
            &self.url,
            &self.small_url,
        ]
            .into_iter()
            .map(|v| v.trim())
        .find(|v| !v.is_empty())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Content {
    /// content type (text, link, ...)
    pub t: String,
    /// value
    pub v: String,
}
