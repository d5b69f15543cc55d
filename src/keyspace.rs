//! # Key Namespacer
//!
//! Builds collision-resistant, length-bounded cache keys from semantic
//! parts. Every key the coordination layer writes goes through here, so
//! backend key-length limits and character restrictions are enforced in
//! exactly one place.

use sha2::{Digest, Sha256};

use crate::constants::{KEY_DIGEST_LENGTH, KEY_ROOT, MAX_KEY_LENGTH, UNKEYED_PLACEHOLDER};

/// Lowercase a part and strip it to the allow-listed character set
/// (ASCII alphanumerics plus `-`, `_`, `.`, `:`).
pub fn sanitize_token(part: &str) -> String {
    part.chars()
        .flat_map(|c| c.to_lowercase())
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
        .collect()
}

/// Short content digest used for query strings and over-length keys.
pub fn digest_token(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(digest)[..KEY_DIGEST_LENGTH].to_string()
}

/// Join sanitized parts under the root prefix, bounding the result to the
/// backend key-length limit.
///
/// Empty parts are dropped. All-empty input yields a stable placeholder
/// rather than failing. Over-length keys are truncated and suffixed with a
/// digest of the full key, keeping them both readable and unique.
pub fn build_key(parts: &[&str]) -> String {
    let mut segments: Vec<String> = Vec::with_capacity(parts.len() + 1);
    segments.push(KEY_ROOT.to_string());
    segments.extend(parts.iter().map(|p| sanitize_token(p)).filter(|p| !p.is_empty()));

    if segments.len() == 1 {
        return format!("{KEY_ROOT}:{UNKEYED_PLACEHOLDER}");
    }

    let key = segments.join(":");
    if key.len() <= MAX_KEY_LENGTH {
        return key;
    }

    let digest = digest_token(&key);
    let keep = MAX_KEY_LENGTH - KEY_DIGEST_LENGTH - 1;
    // Truncation point must land on a char boundary; sanitized keys are
    // pure ASCII so byte indexing is safe.
    format!("{}-{digest}", &key[..keep])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_basic_key_shape() {
        assert_eq!(
            build_key(&["feed", "home", "user-42"]),
            "wayfarer:feed:home:user-42"
        );
    }

    #[test]
    fn test_parts_are_lowercased_and_sanitized() {
        assert_eq!(
            build_key(&["RateLimit", "Trip Join!", "user-7"]),
            "wayfarer:ratelimit:tripjoin:user-7"
        );
    }

    #[test]
    fn test_empty_parts_are_dropped() {
        assert_eq!(build_key(&["", "counter", ""]), "wayfarer:counter");
    }

    #[test]
    fn test_all_empty_yields_placeholder() {
        assert_eq!(build_key(&[]), "wayfarer:unkeyed");
        assert_eq!(build_key(&["", "!!!"]), "wayfarer:unkeyed");
    }

    #[test]
    fn test_long_keys_are_truncated_with_digest() {
        let long = "x".repeat(500);
        let key = build_key(&["search", &long]);
        assert_eq!(key.len(), MAX_KEY_LENGTH);
        assert!(key.starts_with("wayfarer:search:x"));

        // Distinct long inputs must stay distinct after truncation.
        let other = format!("{}y", "x".repeat(499));
        let other_key = build_key(&["search", &other]);
        assert_ne!(key, other_key);
    }

    #[test]
    fn test_digest_token_is_stable_and_short() {
        assert_eq!(digest_token("beaches in lisbon"), digest_token("beaches in lisbon"));
        assert_eq!(digest_token("beaches in lisbon").len(), KEY_DIGEST_LENGTH);
        assert_ne!(digest_token("beaches in lisbon"), digest_token("beaches in porto"));
    }

    proptest! {
        #[test]
        fn prop_keys_are_always_bounded(parts in proptest::collection::vec(".*", 0..8)) {
            let refs: Vec<&str> = parts.iter().map(String::as_str).collect();
            let key = build_key(&refs);
            prop_assert!(key.len() <= MAX_KEY_LENGTH);
            prop_assert!(key.starts_with(KEY_ROOT));
        }

        #[test]
        fn prop_sanitized_output_is_allow_listed(part in ".*") {
            let sanitized = sanitize_token(&part);
            prop_assert!(sanitized
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')));
        }

        #[test]
        fn prop_build_key_is_deterministic(parts in proptest::collection::vec(".*", 0..8)) {
            let refs: Vec<&str> = parts.iter().map(String::as_str).collect();
            prop_assert_eq!(build_key(&refs), build_key(&refs));
        }
    }
}
