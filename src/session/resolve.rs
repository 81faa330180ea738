//! Reference resolution for follow-up commands.
//!
//! A literal substitution: "它" and "那个" become the last entity the
//! assistant acted on. It does not understand grammar, so "那个人" becomes
//! "微信人" when the last entity is 微信.

use std::collections::HashMap;

/// Memory key holding the most recent named entity.
pub const LAST_ENTITY_KEY: &str = "last_entity";

const PRONOUNS: [&str; 2] = ["它", "那个"];

/// Replace pronouns with `memory["last_entity"]`; text is unchanged when
/// there is no remembered entity.
pub fn resolve_reference(text: &str, memory: &HashMap<String, String>) -> String {
    match memory.get(LAST_ENTITY_KEY).filter(|e| !e.is_empty()) {
        Some(entity) => PRONOUNS
            .iter()
            .fold(text.to_string(), |acc, pronoun| acc.replace(pronoun, entity)),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory(entity: &str) -> HashMap<String, String> {
        HashMap::from([(LAST_ENTITY_KEY.to_string(), entity.to_string())])
    }

    #[test]
    fn test_pronouns_replaced() {
        assert_eq!(resolve_reference("关闭它", &memory("微信")), "关闭微信");
        assert_eq!(resolve_reference("打开那个", &memory("Chrome")), "打开Chrome");
    }

    #[test]
    fn test_no_memory_leaves_text() {
        assert_eq!(resolve_reference("关闭它", &HashMap::new()), "关闭它");
        assert_eq!(resolve_reference("关闭它", &memory("")), "关闭它");
    }

    #[test]
    fn test_text_without_pronouns_unchanged() {
        assert_eq!(resolve_reference("打开微信", &memory("Chrome")), "打开微信");
    }
}
