use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::config::GeminiConfig;

use super::{download_image, ExtractError, MenuExtractor};

/// asks for exactly the json `menu_feed_api::WeeklyMenu::parse` understands
pub const MENU_PROMPT: &str = r#"이 이미지는 회사 구내식당의 주간 식단표입니다.
이미지에 있는 월요일부터 금요일까지의 조식과 중식 메뉴를 읽고, 아래 JSON 형식으로만 답하세요.
설명, 마크다운, 코드 블록 없이 JSON 객체 하나만 출력하세요.

{
  "monday": {
    "date": "MM/DD 형식의 날짜, 없으면 null",
    "breakfast": {
      "korean": ["한식 메뉴", "..."],
      "simple": ["간편식 메뉴", "..."]
    },
    "lunch": {
      "korean": ["한식 메뉴", "..."],
      "special": ["일품 메뉴", "..."],
      "salad": ["샐러드 메뉴", "..."]
    }
  },
  "tuesday": { ... },
  "wednesday": { ... },
  "thursday": { ... },
  "friday": { ... }
}

규칙:
- 토요일과 일요일은 포함하지 마세요.
- 메뉴 이름은 이미지에 적힌 그대로 쓰고, 한 칸에 여러 메뉴가 있으면 각각 배열의 항목으로 나누세요.
- 해당 분류에 메뉴가 없으면 빈 배열 대신 null을 쓰세요.
- 조식이나 중식 자체가 없는 날은 "breakfast" 또는 "lunch"를 null로 쓰세요.
- 휴무일은 "breakfast"와 "lunch"를 모두 null로 쓰세요.
- 이미지에서 읽을 수 없는 내용은 추측하지 마세요."#;

pub struct GeminiExtractor {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiExtractor {
    pub fn new(client: reqwest::Client, config: GeminiConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl MenuExtractor for GeminiExtractor {
    fn name(&self) -> &'static str { "gemini" }

    async fn extract(&self, image_url: &str) -> Result<Option<String>, ExtractError> {
        let Some(api_key) = &self.config.api_key else {
            tracing::error!("no gemini api key configured");
            return Err(ExtractError::MissingApiKey("GEMINI_API_KEY"));
        };

        let image = download_image(&self.client, image_url).await?;

        let request = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![
                    RequestPart::Text { text: MENU_PROMPT.into() },
                    RequestPart::InlineData {
                        inline_data: InlineData {
                            mime_type: image.mime_type,
                            data: STANDARD.encode(&image.bytes),
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: format!("application/json"),
                temperature: 0.0,
            },
        };

        let url = format!(
            "{}/models/{}:generateContent",
            self.config.api_url.trim_end_matches('/'),
            self.config.model,
        );
        tracing::info!("analyzing menu image with {}", self.config.model);

        let res: GenerateResponse = self.client.post(url)
            .header("x-goog-api-key", api_key.expose())
            .json(&request)
            .send().await?
            .error_for_status()?
        .json().await?;

        let text = res.candidates.into_iter()
            .next()
            .and_then(|v| v.content)
            .map(|v| v.parts.into_iter()
                .filter_map(|p| p.text)
            .collect::<String>())
        .unwrap_or_default();

        if text.trim().is_empty() {
            tracing::error!("gemini returned an empty answer");
            return Err(ExtractError::EmptyResponse);
        }

        tracing::info!("menu analysis finished ({} chars)", text.len());
        Ok(Some(text))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<RequestContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart {
    Text { text: String },
    #[serde(rename_all = "camelCase")]
    InlineData { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    temperature: f32,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}
