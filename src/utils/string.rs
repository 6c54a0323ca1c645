/// First whitespace-separated token of a command's output, if any
pub fn first_token(s: &str) -> Option<String> {
    s.split_whitespace().next().map(|t| t.to_string())
}

/// Lowercase haystack search, used for release-file and hostname matching
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
