//! Question template catalogue (§4.7, §9): a `token -> template string` map
//! with named placeholders, not code. The renderer errors on a missing
//! placeholder rather than silently leaving it blank.

use rustc_hash::FxHashMap;

/// Renders `template`, substituting `{name}` placeholders from `vars`.
/// Returns the first missing placeholder name as an error.
pub fn render(template: &str, vars: &FxHashMap<&str, String>) -> Result<String, String> {
    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(end) = template[i..].find('}') {
                let key = &template[i + 1..i + end];
                match vars.get(key) {
                    Some(value) => {
                        out.push_str(value);
                        i += end + 1;
                        continue;
                    }
                    None => return Err(key.to_string()),
                }
            }
        }
        let ch = template[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    Ok(out)
}

/// Question-type tokens (§4.7): derived from `(stage, active_label)`, plus
/// the few stage-driven tokens that don't vary by label.
#[must_use]
pub fn template_for(token: &str) -> Option<&'static str> {
    Some(match token {
        "A1.1" => "What specifically about {stimulus} stands out to you? You mentioned {active_content} — tell me more.",
        "C1.1" => "When you think about {active_content}, what does that lead to or make possible for you?",
        "CV1.1" => "And why does that matter to you personally?",
        "ask_again_for_attributes" => "Is there anything else about {stimulus} that stands out to you?",
        "expanded_idea_question" => "Let's go back to {stimulus} for a moment — what else comes to mind?",
        "expanded_attribute_question" => "Thinking about {parent_content}, is there a specific feature or aspect that matters to you?",
        "expanded_consequence_question" => "Building on {parent_content}, what would that change for you day to day?",
        "values_limit_reached" => "Thank you, that gives me a clear picture of what matters to you here.",
        "irrelevant_redirect" => "Let's steer back to {stimulus} — {active_content}.",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_known_placeholders() {
        let mut vars = FxHashMap::default();
        vars.insert("stimulus", "offline playback".to_string());
        let rendered = render("Tell me about {stimulus}.", &vars).unwrap();
        assert_eq!(rendered, "Tell me about offline playback.");
    }

    #[test]
    fn errors_on_missing_placeholder() {
        let vars = FxHashMap::default();
        let err = render("Tell me about {stimulus}.", &vars).unwrap_err();
        assert_eq!(err, "stimulus");
    }
}
