//! Keyword rules for intent classification.
//!
//! The table is scanned in order and the first keyword found anywhere in the
//! text wins, so more specific categories and longer keywords come first:
//! "打开文件" must beat "打开", and "暂停播放" is a pause, not a play.
//! Browser keywords are multi-character so "关闭浏览器" stays an app command.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{json, Map, Value};

use super::{Intent, IntentCategory};

/// Confidence given to any keyword match.
pub const RULE_CONFIDENCE: f32 = 0.85;

/// Confidence given when nothing matched.
pub const UNKNOWN_CONFIDENCE: f32 = 0.3;

const DEFAULT_APP_NAME: &str = "未知应用";
const DEFAULT_FILE_NAME: &str = "新文件";

type Rule = (&'static str, &'static str);

/// Category keyword table: (keyword, canonical action).
pub const RULES: &[(IntentCategory, &[Rule])] = &[
    (
        IntentCategory::Scene,
        &[
            ("准备工作", "prepare_work"),
            ("开始工作", "prepare_work"),
            ("创作模式", "create_mode"),
            ("学习模式", "study_mode"),
            ("放松模式", "relax_mode"),
            ("工作模式", "work_mode"),
        ],
    ),
    (
        IntentCategory::SystemQuery,
        &[
            ("几点", "get_time"),
            ("时间", "get_time"),
            ("日期", "get_date"),
            ("几号", "get_date"),
            ("星期", "get_date"),
        ],
    ),
    (
        IntentCategory::FileOperation,
        &[
            ("打开文件", "open"),
            ("搜索文件", "search"),
            ("查找文件", "search"),
            ("创建", "create"),
            ("新建", "create"),
            ("删除", "delete"),
            ("移动", "move"),
            ("复制", "copy"),
        ],
    ),
    (
        IntentCategory::BrowserControl,
        &[
            ("打开网页", "open"),
            ("访问", "open"),
            ("浏览网页", "open"),
            ("搜索", "search"),
        ],
    ),
    (
        IntentCategory::AppControl,
        &[
            ("打开", "open"),
            ("启动", "open"),
            ("关闭", "close"),
            ("切换", "switch"),
            ("最小化", "minimize"),
        ],
    ),
    (
        IntentCategory::TextProcessing,
        &[
            ("生成文档", "create_document"),
            ("编辑", "edit"),
            ("记录", "write"),
            ("写入", "write"),
            ("写", "write"),
        ],
    ),
    (
        IntentCategory::MediaControl,
        &[
            ("暂停", "pause"),
            ("截图", "screenshot"),
            ("音量", "volume"),
            ("调节", "adjust"),
            ("播放", "play"),
        ],
    ),
];

static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("digit pattern"));

/// Keyword pass. Deterministic: the same text always yields the same intent.
pub fn classify(text: &str) -> Intent {
    for (category, rules) in RULES {
        for (keyword, action) in rules.iter() {
            if text.contains(keyword) {
                return Intent {
                    category: *category,
                    action: action.to_string(),
                    entities: extract_entities(text, *category, action, keyword),
                    confidence: RULE_CONFIDENCE,
                    raw_text: text.to_string(),
                };
            }
        }
    }

    Intent::unknown(text, UNKNOWN_CONFIDENCE)
}

/// Whatever is left once the keyword is removed, interpreted per category.
fn extract_entities(text: &str, category: IntentCategory, action: &str, keyword: &str) -> Map<String, Value> {
    let remainder = text.replace(keyword, "").trim().to_string();
    let mut entities = Map::new();

    match category {
        IntentCategory::AppControl => {
            let app = if remainder.is_empty() { DEFAULT_APP_NAME.to_string() } else { remainder };
            entities.insert("app_name".to_string(), json!(app));
        }
        IntentCategory::FileOperation if action == "search" => {
            entities.insert("query".to_string(), json!(remainder));
        }
        IntentCategory::FileOperation => {
            let path = if remainder.is_empty() { DEFAULT_FILE_NAME.to_string() } else { remainder };
            entities.insert("path".to_string(), json!(path));
        }
        IntentCategory::BrowserControl => {
            if remainder.contains("http") || remainder.contains("www") {
                entities.insert("url".to_string(), json!(remainder));
            } else {
                entities.insert("query".to_string(), json!(remainder));
            }
        }
        IntentCategory::TextProcessing => {
            entities.insert("content".to_string(), json!(remainder));
        }
        IntentCategory::MediaControl => {
            if let Some(level) = DIGITS.find(text).and_then(|m| m.as_str().parse::<i64>().ok()) {
                entities.insert("level".to_string(), json!(level));
            }
            if !remainder.is_empty() {
                entities.insert("music_query".to_string(), json!(remainder));
            }
        }
        IntentCategory::Scene => {
            entities.insert("scene_name".to_string(), json!(keyword));
        }
        IntentCategory::SystemQuery | IntentCategory::Unknown => {}
    }

    entities
}
