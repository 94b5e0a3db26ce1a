use std::cmp::Ordering;

use chrono::Weekday;
use serde_json::{Map, Value};

/// days the cafeteria serves food
pub const SERVICE_DAYS: [Weekday; 5] = [
    Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri,
];

/// display order of the categories the analysis prompt asks for
const CATEGORY_ORDER: [(&str, &str); 6] = [
    ("korean", "한식"),
    ("special", "일품"),
    ("simple", "간편식"),
    ("western", "양식"),
    ("salad", "샐러드"),
    ("dessert", "후식"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeeklyMenu {
    /// is always sorted by weekday
    days: Vec<DayMenu>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayMenu {
    pub weekday: Weekday,
    pub date: Option<String>,
    pub breakfast: Option<Meal>,
    pub lunch: Option<Meal>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Meal {
    pub courses: Vec<Course>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Course {
    pub category: String,
    /// `None` if the analysis explicitly had no items for this category
    pub items: Option<Vec<String>>,
}

impl WeeklyMenu {
    /// parses the json produced by the vision model
    ///
    /// this is lenient on purpose: code fences and surrounding prose are
    /// ignored, unknown keys are skipped and missing days or meals are left
    /// empty. returns `None` if nothing that looks like a weekly menu is found.
    pub fn parse(text: &str) -> Option<Self> {
        let start = text.find('{')?;
        let end = text.rfind('}')?;
        if end < start { return None }

        let value: Value = match serde_json::from_str(&text[start..=end]) {
            Ok(v) => v,
            Err(err) => {
                tracing::debug!("analysis is not json: {err}");
                return None;
            },
        };
        let root = value.as_object()?;
        // some answers wrap the week in a "days" or "menu" object
        let root = ["days", "menu"].iter()
            .find_map(|k| root.get(*k).and_then(Value::as_object))
        .unwrap_or(root);

        let days: Vec<_> = SERVICE_DAYS.iter()
            .filter_map(|&weekday| {
                let day = day_keys(weekday).iter()
                    .find_map(|k| get_ignore_case(root, k))?;
                Some(DayMenu::from_value(weekday, day))
            })
        .collect();

        if days.is_empty() { None } else { Some(Self { days }) }
    }

    pub fn days(&self) -> std::slice::Iter<'_, DayMenu> {
        self.days.iter()
    }

    pub fn day(&self, weekday: Weekday) -> Option<&DayMenu> {
        self.days.iter().find(|v| v.weekday == weekday)
    }
}

impl DayMenu {
    fn from_value(weekday: Weekday, value: &Value) -> Self {
        let obj = value.as_object();
        let field = |keys: &[&str]| obj.and_then(|o| {
            keys.iter().find_map(|k| get_ignore_case(o, k))
        });

        Self {
            weekday,
            date: field(&["date", "날짜"])
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|v| !v.is_empty())
            .map(ToOwned::to_owned),
            breakfast: field(&["breakfast", "조식"]).and_then(Meal::from_value),
            lunch: field(&["lunch", "중식"]).and_then(Meal::from_value),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.breakfast.is_none() && self.lunch.is_none()
    }
}

impl Meal {
    fn from_value(value: &Value) -> Option<Self> {
        let mut courses: Vec<_> = match value {
            Value::Object(obj) => obj.iter()
                .map(|(k, v)| Course {
                    category: k.trim().to_string(),
                    items: items_from_value(v),
                })
            .collect(),
            // a bare list without categories
            Value::Array(_) => vec![Course {
                category: String::new(),
                items: items_from_value(value),
            }],
            _ => return None,
        };

        courses.sort_by(|a, b| compare_categories(&a.category, &b.category));
        if courses.is_empty() { None } else { Some(Self { courses }) }
    }
}

impl Course {
    pub fn label(&self) -> &str {
        category_label(&self.category)
    }
}

fn items_from_value(value: &Value) -> Option<Vec<String>> {
    let items: Vec<String> = match value {
        Value::Array(v) => v.iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(ToOwned::to_owned)
        .collect(),
        Value::String(s) => s.split([',', '\n'])
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(ToOwned::to_owned)
        .collect(),
        _ => return None,
    };

    if items.is_empty() { None } else { Some(items) }
}

fn get_ignore_case<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get(key).or_else(|| {
        obj.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)
    })
}

fn day_keys(weekday: Weekday) -> [&'static str; 3] {
    match weekday {
        Weekday::Mon => ["monday", "mon", "월요일"],
        Weekday::Tue => ["tuesday", "tue", "화요일"],
        Weekday::Wed => ["wednesday", "wed", "수요일"],
        Weekday::Thu => ["thursday", "thu", "목요일"],
        Weekday::Fri => ["friday", "fri", "금요일"],
        Weekday::Sat => ["saturday", "sat", "토요일"],
        Weekday::Sun => ["sunday", "sun", "일요일"],
    }
}

pub fn weekday_name(weekday: Weekday) -> &'static str {
    day_keys(weekday)[2]
}

pub fn category_label(category: &str) -> &str {
    CATEGORY_ORDER.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(category))
        .map(|(_, label)| *label)
    .unwrap_or(category)
}

fn compare_categories(a: &str, b: &str) -> Ordering {
    let rank = |c: &str| CATEGORY_ORDER.iter()
        .position(|(k, _)| k.eq_ignore_ascii_case(c))
    .unwrap_or(CATEGORY_ORDER.len());

    rank(a).cmp(&rank(b)).then_with(|| a.cmp(b))
}
