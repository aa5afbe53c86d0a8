//! Prompts for the chat-backed capabilities
//!
//! Every prompt asks for a bare JSON answer so the response can be parsed
//! without heuristics.

/// Categorization prompt
///
/// Placeholder: {content} - the memory content to tag
pub const CATEGORIZE_PROMPT: &str = r#"Assign semantic categories to the following memory about a user.

Categories are short lowercase tags such as "diet", "allergy", "health",
"preferences", "goals", "schedule" or "family". Use between one and four
categories. Reuse common tags instead of inventing near-duplicates.

Memory:
{content}

Respond with a JSON array of strings, for example ["diet", "preferences"].
Only include the JSON array, no other text."#;

/// Validation prompt
///
/// Placeholders: {content} - the memory to check, {context} - recent
/// information to check it against
pub const VALIDATE_PROMPT: &str = r#"Decide whether the following memory about a user is still accurate.

Memory:
{content}

Recent context:
{context}

Respond with a JSON object in this exact format:
{
  "is_valid": true,
  "confidence": 0.9,
  "reason": "Short explanation",
  "suggested_update": null
}

Set "suggested_update" to corrected memory text when the memory is outdated
or wrong, otherwise null. Only include the JSON object, no other text."#;

/// Reflection prompt
///
/// Placeholders: {memories} - numbered memories, {context} - optional focus
pub const REFLECT_PROMPT: &str = r#"Review the following memories about a user and derive higher-level insights.

An insight is a pattern, preference, or conclusion that follows from several
memories together and would help an assistant serve the user better.

Memories:
{memories}

Focus:
{context}

Respond with a JSON array of strings, one insight per entry.
Only include the JSON array, no other text."#;

/// Placeholder text when no context is supplied
pub const NO_CONTEXT: &str = "(none)";

pub fn categorize_prompt(content: &str) -> String {
    CATEGORIZE_PROMPT.replace("{content}", content)
}

pub fn validate_prompt(content: &str, context: Option<&str>) -> String {
    VALIDATE_PROMPT
        .replace("{content}", content)
        .replace("{context}", context.unwrap_or(NO_CONTEXT))
}

pub fn reflect_prompt(memories: &[String], context: Option<&str>) -> String {
    let numbered = memories
        .iter()
        .enumerate()
        .map(|(i, m)| format!("{}. {m}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");
    REFLECT_PROMPT
        .replace("{memories}", &numbered)
        .replace("{context}", context.unwrap_or(NO_CONTEXT))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_prompt_without_context() {
        let prompt = validate_prompt("User is vegetarian", None);
        assert!(prompt.contains("User is vegetarian"));
        assert!(prompt.contains(NO_CONTEXT));
        assert!(!prompt.contains("{content}"));
    }

    #[test]
    fn test_reflect_prompt_numbers_memories() {
        let prompt = reflect_prompt(
            &["Eats oats daily".to_string(), "Skips lunch".to_string()],
            Some("breakfast habits"),
        );
        assert!(prompt.contains("1. Eats oats daily\n2. Skips lunch"));
        assert!(prompt.contains("breakfast habits"));
    }
}
