//! Collision-free artifact names.
//!
//! Every request draws one [`Token`] and derives both its staged input name
//! (`Temp_<token>.<ext>`) and its published output name (`image_<token>.png`)
//! from it, so the two files of a request can always be matched up in logs.

use core::fmt;
use rand::Rng;

/// Extension used for published outputs and for uploads whose own extension
/// is unusable.
pub const DEFAULT_EXTENSION: &str = "png";

/// Lower bound of the per-request generation seed (15 decimal digits).
pub const SEED_MIN: u64 = 100_000_000_000_000;

/// Upper bound (inclusive) of the per-request generation seed.
pub const SEED_MAX: u64 = 999_999_999_999_999;

const MAX_EXTENSION_LEN: usize = 8;

const PUBLISHED_PREFIX: &str = "image_";

/// A random 128-bit identifier rendered as 32 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Token(u128);

impl Token {
    /// Draws a fresh token from the thread-local RNG.
    pub fn random() -> Self {
        Self(rand::rng().random())
    }

    /// Name of the staged input for this token.
    ///
    /// The extension is taken from `original_filename` when it is a short
    /// alphanumeric string and falls back to [`DEFAULT_EXTENSION`] otherwise.
    pub fn staged_name(&self, original_filename: &str) -> String {
        format!("Temp_{self}.{}", staged_extension(original_filename))
    }

    /// Name under which the claimed output is published.
    pub fn published_name(&self) -> String {
        format!("{PUBLISHED_PREFIX}{self}.{DEFAULT_EXTENSION}")
    }

    /// Name a stale pending output is moved to before a new generation.
    pub fn quarantine_name(&self) -> String {
        format!("stale_{self}.{DEFAULT_EXTENSION}")
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Draws a generation seed uniformly from `[SEED_MIN, SEED_MAX]`.
///
/// A new seed per request keeps repeated prompts from producing identical
/// images.
pub fn random_seed() -> u64 {
    rand::rng().random_range(SEED_MIN..=SEED_MAX)
}

fn staged_extension(original_filename: &str) -> String {
    original_filename
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.bytes().all(|b| b.is_ascii_alphanumeric())
        })
        .map_or_else(|| DEFAULT_EXTENSION.to_string(), str::to_ascii_lowercase)
}

/// Returns `true` if `name` is exactly what [`Token::published_name`]
/// produces.
///
/// The output area also holds the shared pending file and quarantined
/// leftovers; neither matches.
pub fn is_published_name(name: &str) -> bool {
    name.strip_prefix(PUBLISHED_PREFIX)
        .and_then(|rest| rest.strip_suffix(DEFAULT_EXTENSION))
        .and_then(|rest| rest.strip_suffix('.'))
        .is_some_and(|hex| {
            hex.len() == 32 && hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        })
}

/// Returns `true` if `name` is a plain file name that stays inside its
/// directory.
///
/// Only ASCII alphanumerics, `.`, `_` and `-` are accepted, with no leading
/// `.` and no `..`.
pub fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains("..")
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn token_renders_as_32_hex_chars() {
        let token = Token(0xdead_beef);
        assert_eq!(token.to_string(), "000000000000000000000000deadbeef");
        let random = Token::random().to_string();
        assert_eq!(random.len(), 32);
        assert!(random.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn tokens_do_not_collide() {
        let tokens: HashSet<_> = (0..10_000).map(|_| Token::random()).collect();
        assert_eq!(tokens.len(), 10_000);

        let names: HashSet<_> = (0..10_000)
            .map(|_| Token::random().published_name())
            .collect();
        assert_eq!(names.len(), 10_000);
    }

    #[test]
    fn names_share_the_request_token() {
        let token = Token(1);
        let hex = "00000000000000000000000000000001";
        assert_eq!(token.staged_name("cat.JPG"), format!("Temp_{hex}.jpg"));
        assert_eq!(token.published_name(), format!("image_{hex}.png"));
        assert_eq!(token.quarantine_name(), format!("stale_{hex}.png"));
    }

    #[test]
    fn staged_extension_falls_back_to_png() {
        assert_eq!(staged_extension("sketch"), "png");
        assert_eq!(staged_extension("sketch."), "png");
        assert_eq!(staged_extension("a.b/../../etc"), "png");
        assert_eq!(staged_extension("weird.ext with space"), "png");
        assert_eq!(staged_extension("long.abcdefghijk"), "png");
        assert_eq!(staged_extension("photo.webp"), "webp");
    }

    #[test]
    fn seeds_stay_in_range() {
        for _ in 0..1_000 {
            let seed = random_seed();
            assert!((SEED_MIN..=SEED_MAX).contains(&seed));
        }
    }

    #[test]
    fn plain_file_names_reject_traversal() {
        assert!(is_plain_file_name("image_0123abcd.png"));
        assert!(is_plain_file_name("image.png"));
        assert!(!is_plain_file_name(""));
        assert!(!is_plain_file_name(".."));
        assert!(!is_plain_file_name(".hidden"));
        assert!(!is_plain_file_name("a/b.png"));
        assert!(!is_plain_file_name("a\\b.png"));
        assert!(!is_plain_file_name("image..png"));
    }

    #[test]
    fn only_published_names_match() {
        let token = Token::random();
        assert!(is_published_name(&token.published_name()));

        assert!(!is_published_name("image.png"));
        assert!(!is_published_name(&token.quarantine_name()));
        assert!(!is_published_name(&token.staged_name("cat.png")));
        assert!(!is_published_name("image_abc.png"));
        assert!(!is_published_name(&format!("image_{}.png", "A".repeat(32))));
        assert!(!is_published_name(&format!("image_{token}.jpg")));
        assert!(!is_published_name(&format!("image_{token}png")));
        assert!(!is_published_name(&format!("image_{token}.png.bak")));
    }
}
