use serde::{Deserialize, Serialize};

/// Meta keys participating in the diff, paired with the feed column each is
/// sourced from. The emitted payload and the projection of the current
/// product both use exactly this set, in this order.
pub const META_COLUMNS: [(&str, &str); 15] = [
    ("spq", "spq"),
    ("manufacturer", "manufacturer"),
    ("image_url", "image_url"),
    ("datasheet_url", "datasheet_url"),
    ("series_url", "series_url"),
    ("series", "series"),
    ("quantity", "quantity"),
    ("operating_temperature", "operating_temp"),
    ("voltage", "supply_voltage"),
    ("package", "packaging_type"),
    ("supplier_device_package", "supplier_device_package"),
    ("mounting_type", "mounting_type"),
    ("short_description", "product_description"),
    ("detail_description", "long_description"),
    ("additional_key_information", "additional_info"),
];

pub fn meta_key_whitelisted(key: &str) -> bool {
    META_COLUMNS.iter().any(|(k, _)| *k == key)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaEntry {
    pub key: String,
    pub value: String,
}

impl MetaEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Update emitted for one row when a material difference exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePayload {
    pub remote_id: u64,
    /// Kept for attribution in logs and failure reports; never diffed and
    /// never sent as a field of its own.
    pub part_number: String,
    pub sku: String,
    pub description: String,
    pub meta_data: Vec<MetaEntry>,
}

/// Current remote product as returned by the catalog API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteProduct {
    pub id: u64,
    #[serde(default)]
    pub sku: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub meta_data: Vec<MetaEntry>,
}

/// Whitelisted projection of a remote product used for diffing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalProduct {
    pub sku: String,
    pub description: String,
    pub meta_data: Vec<MetaEntry>,
}

/// Reference to one payload of a failed bulk call, for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItemRef {
    pub part_number: String,
    pub remote_id: u64,
}

/// Per-id result of a bulk update call.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkUpdateResult {
    pub id: u64,
    #[serde(default)]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitelist_covers_mapping_keys() {
        assert_eq!(META_COLUMNS.len(), 15);
        for (key, _) in META_COLUMNS {
            assert!(meta_key_whitelisted(key));
        }
        assert!(!meta_key_whitelisted("id"));
        assert!(!meta_key_whitelisted("part_number"));
    }
}
