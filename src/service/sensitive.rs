use std::sync::LazyLock;

use regex::Regex;

static CREDENTIAL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)api[_-]key|password|secret|token|access[_-]key|private[_-]key|auth|credential",
    )
    .expect("credential pattern is valid")
});

/// Returns true if the text contains anything that looks like a credential.
///
/// This is a coarse substring match: "author" and "tokenize" both count.
pub fn classify(text: &str) -> bool {
    CREDENTIAL_PATTERN.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_credential_words() {
        assert!(classify("my api_key is 12345"));
        assert!(classify("Set the API-KEY header"));
        assert!(classify("PASSWORD: hunter2"));
        assert!(classify("rotate the private_key monthly"));
        assert!(classify("send the Access-Key over"));
        assert!(classify("OAuth flow is broken"));
    }

    #[test]
    fn test_plain_text_is_clean() {
        assert!(!classify("Build a landing page for my bakery"));
        assert!(!classify("api key")); // space is not a separator the pattern accepts
        assert!(!classify(""));
    }
}
