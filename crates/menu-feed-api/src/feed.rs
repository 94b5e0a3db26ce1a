use super::raw::{self, PostItem};

/// title fragments the cafeteria uses for the weekly menu post
pub const WEEKLY_MENU_KEYWORDS: [&str; 2] = ["주간식단메뉴표", "주간메뉴표"];

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("no feed url configured")]
    MissingUrl,
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
}

#[derive(Clone)]
pub struct FeedClient {
    client: reqwest::Client,
    url: Option<String>,
}

impl FeedClient {
    pub fn new(client: reqwest::Client, url: Option<String>) -> Self {
        Self { client, url }
    }

    /// fetches the feed and returns the newest post that looks like a weekly menu
    pub async fn fetch_latest_weekly_menu(
        &self, url: Option<&str>,
    ) -> Result<Option<PostItem>, FeedError> {
        let url = url
            .or(self.url.as_deref())
            .filter(|v| !v.is_empty())
        .ok_or(FeedError::MissingUrl)?;

        tracing::info!("fetching feed from {url}");
        let data: raw::ApiResponse = self.client.get(url)
            .send().await?
            .error_for_status()?
        .json().await?;

        Ok(latest_weekly_menu(data.posts.items))
    }
}

pub fn is_weekly_menu(title: &str) -> bool {
    WEEKLY_MENU_KEYWORDS.iter().any(|k| title.contains(k))
}

pub fn latest_weekly_menu(mut posts: Vec<PostItem>) -> Option<PostItem> {
    posts.sort_unstable_by(|a, b| b.created_at.cmp(&a.created_at));
    posts.into_iter().find(|v| is_weekly_menu(&v.title))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{matchers::{method, path}, Mock, MockServer, ResponseTemplate};

    fn post(id: u64, title: &str, created_at: i64) -> PostItem {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "title": title,
            "created_at": created_at,
        })).unwrap()
    }

    #[test]
    fn picks_newest_matching_post() {
        let posts = vec![
            post(1, "3월 3주차 주간식단메뉴표", 100),
            post(2, "회식 안내", 400),
            post(3, "3월 4주차 주간메뉴표", 300),
            post(4, "3월 2주차 주간식단메뉴표", 50),
        ];

        let found = latest_weekly_menu(posts).unwrap();
        assert_eq!(found.id, 3);
    }

    #[test]
    fn no_match_is_none() {
        let posts = vec![post(1, "회식 안내", 100), post(2, "공지사항", 200)];
        assert!(latest_weekly_menu(posts).is_none());
        assert!(latest_weekly_menu(Vec::new()).is_none());
    }

    #[tokio::test]
    async fn fetches_from_override_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/posts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "posts": { "items": [
                    { "id": 1, "title": "회식 안내", "created_at": 100 },
                    { "id": 2, "title": "3월 4주차 주간식단메뉴표", "created_at": 200,
                      "media": [{ "xlarge_url": "https://img/menu.jpg" }] },
                ] }
            })))
            .expect(1)
        .mount(&server).await;

        let client = FeedClient::new(reqwest::Client::new(), None);
        let url = format!("{}/posts", server.uri());
        let found = client.fetch_latest_weekly_menu(Some(&url)).await
            .unwrap()
        .unwrap();

        assert_eq!(found.id, 2);
        assert_eq!(found.media[0].best_url(), Some("https://img/menu.jpg"));
    }

    #[tokio::test]
    async fn upstream_error_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
        .mount(&server).await;

        let client = FeedClient::new(reqwest::Client::new(), Some(server.uri()));
        let res = client.fetch_latest_weekly_menu(None).await;
        assert!(matches!(res, Err(FeedError::Reqwest(_))));
    }

    #[tokio::test]
    async fn missing_url_is_an_error() {
        let client = FeedClient::new(reqwest::Client::new(), None);
        let res = client.fetch_latest_weekly_menu(None).await;
        assert!(matches!(res, Err(FeedError::MissingUrl)));
    }
}
