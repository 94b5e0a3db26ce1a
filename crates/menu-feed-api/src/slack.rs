use std::fmt::Write;

use serde::{Deserialize, Serialize};

use super::processed::{weekday_name, DayMenu, Meal, WeeklyMenu};

pub const MENU_TITLE: &str = "이번 주 식단표";
pub const MENU_COLOR: &str = "#36a64f";

/// slack refuses section texts longer than this
const SECTION_TEXT_LIMIT: usize = 3000;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MenuStyle {
    #[default] Standard,
    Markdown,
}

impl MenuStyle {
    /// `format=markdown` selects markdown, everything else the attachment style
    pub fn from_query(format: Option<&str>) -> Self {
        match format {
            Some(v) if v.eq_ignore_ascii_case("markdown") => Self::Markdown,
            _ => Self::Standard,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlackMessage {
    /// fallback for notifications
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attachment {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_link: Option<String>,
    pub text: String,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub mrkdwn_in: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Header { text: Text },
    Section { text: Text },
    Divider,
    Image { image_url: String, alt_text: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "text", rename_all = "snake_case")]
pub enum Text {
    PlainText(String),
    Mrkdwn(String),
}

/// messenger independent notification, used for everything that is not slack
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub color: Option<String>,
    pub url: Option<String>,
}

pub fn to_slack_message(menu_text: &str, image_url: &str, style: MenuStyle) -> SlackMessage {
    match style {
        MenuStyle::Standard => to_attachment_message(menu_text, image_url),
        MenuStyle::Markdown => to_markdown_message(menu_text, image_url),
    }
}

pub fn to_attachment_message(menu_text: &str, image_url: &str) -> SlackMessage {
    let text = match WeeklyMenu::parse(menu_text) {
        Some(menu) => menu.days()
            .map(render_day)
            .collect::<Vec<_>>()
        .join("\n\n"),
        None => menu_text.trim().to_string(),
    };

    SlackMessage {
        text: format!(":bento: {MENU_TITLE}"),
        attachments: vec![Attachment {
            title: MENU_TITLE.into(),
            title_link: non_empty(image_url),
            text,
            color: MENU_COLOR.into(),
            image_url: non_empty(image_url),
            mrkdwn_in: vec![format!("text")],
        }],
        blocks: Vec::new(),
    }
}

pub fn to_markdown_message(menu_text: &str, image_url: &str) -> SlackMessage {
    let mut blocks = vec![Block::Header {
        text: Text::PlainText(format!(":bento: {MENU_TITLE}")),
    }];

    match WeeklyMenu::parse(menu_text) {
        Some(menu) => for (i, day) in menu.days().enumerate() {
            if i > 0 { blocks.push(Block::Divider) }
            blocks.push(Block::Section {
                text: Text::Mrkdwn(truncate(&render_day(day), SECTION_TEXT_LIMIT)),
            });
        },
        None => blocks.push(Block::Section {
            // the fences must survive truncation
            text: Text::Mrkdwn(format!(
                "```{}```",
                truncate(menu_text.trim(), SECTION_TEXT_LIMIT - 6),
            )),
        }),
    }

    if let Some(url) = non_empty(image_url) {
        blocks.push(Block::Image {
            image_url: url,
            alt_text: MENU_TITLE.into(),
        });
    }

    SlackMessage {
        text: MENU_TITLE.into(),
        attachments: Vec::new(),
        blocks,
    }
}

pub fn to_notification(menu_text: &str, image_url: &str) -> Notification {
    let message = match WeeklyMenu::parse(menu_text) {
        Some(menu) => menu.days()
            .map(render_day)
            .collect::<Vec<_>>()
        .join("\n\n"),
        None => menu_text.trim().to_string(),
    };

    Notification {
        title: MENU_TITLE.into(),
        // slack uses single, everyone else double stars
        message: message.replace('*', "**"),
        color: Some(MENU_COLOR.into()),
        url: non_empty(image_url),
    }
}

fn render_day(day: &DayMenu) -> String {
    let mut out = match &day.date {
        Some(date) => format!("*{} ({date})*", weekday_name(day.weekday)),
        None => format!("*{}*", weekday_name(day.weekday)),
    };

    if day.is_empty() {
        out.push_str("\n메뉴 정보 없음");
        return out;
    }

    for (name, meal) in [("조식", &day.breakfast), ("중식", &day.lunch)] {
        let Some(meal) = meal else { continue };
        _ = write!(out, "\n_{name}_");
        render_meal(&mut out, meal);
    }

    out
}

fn render_meal(out: &mut String, meal: &Meal) {
    for course in &meal.courses {
        let items = course.items.as_ref()
            .map(|v| v.join(", "))
        .unwrap_or_else(|| format!("-"));

        if course.category.is_empty() {
            _ = write!(out, "\n• {items}");
        } else {
            _ = write!(out, "\n• {}: {items}", course.label());
        }
    }
}

fn non_empty(v: &str) -> Option<String> {
    let v = v.trim();
    if v.is_empty() { None } else { Some(v.to_string()) }
}

pub fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        None => s.to_string(),
        Some((i, _)) => {
            let mut out = s[..i].to_string();
            out.pop();
            out.push('…');
            out
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANALYSIS: &str = r#"{
        "monday": { "date": "03/24", "breakfast": { "korean": ["쌀밥", "미역국"] }, "lunch": { "special": ["돈까스"] } },
        "tuesday": { "date": "03/25", "breakfast": null, "lunch": null }
    }"#;
    const IMAGE: &str = "https://img/menu.jpg";

    #[test]
    fn attachment_style_renders_days() {
        let msg = to_attachment_message(ANALYSIS, IMAGE);
        assert!(msg.blocks.is_empty());

        let att = &msg.attachments[0];
        assert_eq!(att.color, MENU_COLOR);
        assert_eq!(att.image_url.as_deref(), Some(IMAGE));
        assert_eq!(
            att.text,
            "*월요일 (03/24)*\n_조식_\n• 한식: 쌀밥, 미역국\n_중식_\n• 일품: 돈까스\n\n*화요일 (03/25)*\n메뉴 정보 없음",
        );
    }

    #[test]
    fn markdown_style_uses_blocks() {
        let msg = to_markdown_message(ANALYSIS, IMAGE);
        assert!(msg.attachments.is_empty());
        assert!(matches!(msg.blocks.first(), Some(Block::Header { .. })));
        assert!(matches!(msg.blocks.last(), Some(Block::Image { .. })));
        // header, monday, divider, tuesday, image
        assert_eq!(msg.blocks.len(), 5);

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["blocks"][1]["type"], "section");
        assert_eq!(json["blocks"][1]["text"]["type"], "mrkdwn");
        assert_eq!(json["blocks"][2]["type"], "divider");
        assert!(json.get("attachments").is_none());
    }

    #[test]
    fn styles_are_deterministic_and_distinct() {
        let a = to_slack_message(ANALYSIS, IMAGE, MenuStyle::Standard);
        let b = to_slack_message(ANALYSIS, IMAGE, MenuStyle::Standard);
        let c = to_slack_message(ANALYSIS, IMAGE, MenuStyle::Markdown);
        let d = to_slack_message(ANALYSIS, IMAGE, MenuStyle::Markdown);
        assert_eq!(a, b);
        assert_eq!(c, d);
        assert_ne!(a, c);
    }

    #[test]
    fn unparsed_text_is_passed_through() {
        let msg = to_attachment_message("쌀밥\n미역국\n", "");
        assert_eq!(msg.attachments[0].text, "쌀밥\n미역국");
        assert_eq!(msg.attachments[0].image_url, None);

        let msg = to_markdown_message("쌀밥\n미역국", "");
        assert_eq!(msg.blocks.len(), 2);
    }

    #[test]
    fn long_unparsed_text_keeps_code_fence() {
        let text = "가".repeat(SECTION_TEXT_LIMIT * 2);
        let msg = to_markdown_message(&text, "");
        let Block::Section { text: Text::Mrkdwn(section) } = &msg.blocks[1] else {
            panic!("expected a markdown section, got {:?}", msg.blocks[1]);
        };
        assert!(section.starts_with("```"));
        assert!(section.ends_with("…```"));
        assert_eq!(section.chars().count(), SECTION_TEXT_LIMIT);
    }

    #[test]
    fn style_from_query() {
        assert_eq!(MenuStyle::from_query(Some("markdown")), MenuStyle::Markdown);
        assert_eq!(MenuStyle::from_query(Some("plain")), MenuStyle::Standard);
        assert_eq!(MenuStyle::from_query(None), MenuStyle::Standard);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("가나다", 5), "가나다");
        assert_eq!(truncate("가나다라", 3), "가나…");
    }
}
