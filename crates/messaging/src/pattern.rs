//! Topic binding-pattern matching.

/// Matches a routing key against an AMQP-style topic pattern.
///
/// Patterns and keys are dot-separated words; `*` matches exactly one
/// word, `#` matches zero or more words.
pub(crate) fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    matches_words(&pattern, &key)
}

fn matches_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.first() {
        None => key.is_empty(),
        Some(&"#") => {
            // Swallow zero words, or one word and try again.
            matches_words(&pattern[1..], key)
                || (!key.is_empty() && matches_words(pattern, &key[1..]))
        }
        Some(&"*") => !key.is_empty() && matches_words(&pattern[1..], &key[1..]),
        Some(word) => {
            key.first() == Some(word) && matches_words(&pattern[1..], &key[1..])
        }
    }
}
