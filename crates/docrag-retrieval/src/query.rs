use tracing::warn;

/// Substrings that mark a query as an injection attempt, matched case-insensitively.
pub const SUSPICIOUS_PATTERNS: &[&str] = &[
    " DROP ", " DELETE ", " UPDATE ", " INSERT ", "<SCRIPT>", "</SCRIPT>", "JAVASCRIPT:", "SELECT ", " FROM ", " WHERE ",
];

/// False for blank queries and queries containing a suspicious pattern.
pub fn validate_query(query: &str) -> bool {
    if query.trim().is_empty() {
        return false;
    }
    let upper = query.to_uppercase();
    if let Some(pattern) = SUSPICIOUS_PATTERNS.iter().find(|p| upper.contains(*p)) {
        warn!(pattern = pattern.trim(), query = %preview(query, 100), "Suspicious query rejected");
        return false;
    }
    true
}

/// First `max` characters, for logs.
pub fn preview(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_injected_queries_fail() {
        assert!(!validate_query(""));
        assert!(!validate_query("  \n\t"));
        assert!(!validate_query("please drop table users"));
        assert!(!validate_query("x; select * from docs"));
        assert!(!validate_query("<Script>alert(1)</script>"));
        assert!(!validate_query("JavaScript:void(0)"));
    }

    #[test]
    fn ordinary_questions_pass() {
        assert!(validate_query("What is machine learning?"));
        assert!(validate_query("How do updates work?"));
        assert!(validate_query("dropout in neural networks"));
    }
}
