//! ---
//! spine_section: "02-messaging-ipc-data-model"
//! spine_subsection: "module"
//! spine_type: "source"
//! spine_scope: "code"
//! spine_description: "Transport implementations for messaging layers."
//! spine_version: "v0.1.0"
//! spine_owner: "tbd"
//! ---

/// Topic-exchange matching: words are separated by `.`, `*` matches exactly
/// one word and `#` matches zero or more words.
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    matches_words(&pattern, &key)
}

fn matches_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| matches_words(rest, &key[skip..])),
        Some((&"*", rest)) => !key.is_empty() && matches_words(rest, &key[1..]),
        Some((word, rest)) => key.first() == Some(word) && matches_words(rest, &key[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_keys_match() {
        assert!(topic_matches(
            "components.worker-1.inbox",
            "components.worker-1.inbox"
        ));
        assert!(!topic_matches(
            "components.worker-1.inbox",
            "components.worker-2.inbox"
        ));
        assert!(!topic_matches("components.worker-1", "components.worker-1.inbox"));
    }

    #[test]
    fn star_matches_one_word() {
        assert!(topic_matches("components.*.inbox", "components.a.inbox"));
        assert!(!topic_matches("components.*.inbox", "components.inbox"));
        assert!(!topic_matches("components.*.inbox", "components.a.b.inbox"));
    }

    #[test]
    fn hash_matches_any_number_of_words() {
        assert!(topic_matches("components.#", "components"));
        assert!(topic_matches("components.#", "components.a.inbox"));
        assert!(topic_matches("#", "anything.at.all"));
        assert!(topic_matches("#.inbox", "components.a.inbox"));
        assert!(!topic_matches("#.inbox", "components.a.outbox"));
    }
}
