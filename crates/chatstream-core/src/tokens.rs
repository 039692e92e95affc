/// Rough token count for `text` under `model`, used for context window checks
pub fn estimate_tokens(text: &str, model: &str) -> usize {
    let chars_per_token = if model.contains("claude") {
        3.5
    } else {
        4.0
    };
    
    (text.len() as f64 / chars_per_token).ceil() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_estimation() {
        let text = "This is a test message";
        let tokens = estimate_tokens(text, "gpt-4o-mini");
        assert_eq!(tokens, 6);
        assert!(estimate_tokens(text, "anthropic.claude-3-haiku") >= tokens);
        assert_eq!(estimate_tokens("", "gpt-4o-mini"), 0);
    }
}
