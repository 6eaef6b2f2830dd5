use serde::{Deserialize, Serialize};

/// A single CSV object inside the selected date folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedObject {
    pub bucket: String,
    pub key: String,
}

impl FeedObject {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Stable identifier used as the primary key in counters, checkpoints
    /// and job ids. Derived from the object key so that the same object
    /// maps to the same feed across restarts.
    pub fn feed_key(&self) -> String {
        feed_key_for(&self.key)
    }
}

/// Normalizes an object key into a feed key: path separators, whitespace
/// and colons become `_` so the key is safe in composite store keys.
pub fn feed_key_for(object_key: &str) -> String {
    object_key
        .trim()
        .chars()
        .map(|c| {
            if c == '/' || c == '\\' || c == ':' || c.is_whitespace() {
                '_'
            } else {
                c
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_key_is_stable_and_safe() {
        assert_eq!(
            feed_key_for("07-21-2026/products a.csv"),
            "07-21-2026_products_a.csv"
        );
        assert_eq!(feed_key_for("plain.csv"), "plain.csv");
    }

    #[test]
    fn same_object_same_key() {
        let a = FeedObject::new("bucket", "07-21-2026/feed.csv");
        let b = FeedObject::new("bucket", "07-21-2026/feed.csv");
        assert_eq!(a.feed_key(), b.feed_key());
    }
}
