//! Content-filter profile model
//!
//! Mirrors the remote profile document: parental-control scalars, category
//! and service filter lists, deny/allow lists, and passthrough blocks for
//! sub-resources this service relays but does not interpret.

use serde::{Deserialize, Serialize};

/// One toggleable entry in a filter list.
///
/// Categories and services are keyed by a vocabulary id ("ads",
/// "gambling", "tiktok"); deny/allow rules are keyed by domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterEntry {
    pub id: String,
    pub active: bool,
}

impl FilterEntry {
    pub fn new(id: impl Into<String>, active: bool) -> Self {
        Self {
            id: id.into(),
            active,
        }
    }
}

/// Which parental-control list an id belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Category,
    Service,
}

impl FilterKind {
    /// Parse a list name from a route segment, singular or plural.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "category" | "categories" => Some(FilterKind::Category),
            "service" | "services" => Some(FilterKind::Service),
            _ => None,
        }
    }
}

/// Parental-control block of a profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ParentalControl {
    pub safe_search: bool,
    pub youtube_restricted_mode: bool,
    pub block_bypass: bool,
    pub categories: Vec<FilterEntry>,
    pub services: Vec<FilterEntry>,
}

impl ParentalControl {
    fn entries(&self, kind: FilterKind) -> &[FilterEntry] {
        match kind {
            FilterKind::Category => &self.categories,
            FilterKind::Service => &self.services,
        }
    }

    /// Current `active` value of an entry, if the profile has it.
    pub fn entry_active(&self, kind: FilterKind, id: &str) -> Option<bool> {
        self.entries(kind).iter().find(|e| e.id == id).map(|e| e.active)
    }

    /// Requested ids that do not exist in the profile list, in request order.
    pub fn unknown_ids<'a>(
        &self,
        kind: FilterKind,
        requested: impl Iterator<Item = &'a str>,
    ) -> Vec<String> {
        let entries = self.entries(kind);
        requested
            .filter(|id| !entries.iter().any(|e| e.id == *id))
            .map(str::to_string)
            .collect()
    }
}

/// Validation message naming every offending id.
pub(crate) fn unknown_ids_message(categories: &[String], services: &[String]) -> String {
    let mut parts = Vec::new();
    if !categories.is_empty() {
        parts.push(format!("unknown category ids: {}", categories.join(", ")));
    }
    if !services.is_empty() {
        parts.push(format!("unknown service ids: {}", services.join(", ")));
    }
    parts.join("; ")
}

/// Full profile snapshot as served by the remote API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Profile {
    /// Profile id; absent in the raw document, filled in by the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: Option<String>,
    pub parental_control: ParentalControl,
    pub denylist: Vec<FilterEntry>,
    pub allowlist: Vec<FilterEntry>,
    pub privacy: serde_json::Value,
    pub security: serde_json::Value,
    pub performance: serde_json::Value,
    pub settings: serde_json::Value,
}

impl Profile {
    /// Deny-list entry for a domain, if present.
    pub fn denylist_entry(&self, domain: &str) -> Option<&FilterEntry> {
        self.denylist.iter().find(|e| e.id == domain)
    }
}

/// Partial parental-control update sent to the remote API.
///
/// Absent scalars and empty lists are left out of the payload so the
/// remote only touches what the patch names.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentalPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safe_search: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub youtube_restricted_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_bypass: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<FilterEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<FilterEntry>,
}

impl ParentalPatch {
    pub fn is_empty(&self) -> bool {
        self.safe_search.is_none()
            && self.youtube_restricted_mode.is_none()
            && self.block_bypass.is_none()
            && self.categories.is_empty()
            && self.services.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_parses_remote_document() {
        let doc = r#"{
            "name": "Home",
            "parentalControl": {
                "safeSearch": false,
                "youtubeRestrictedMode": false,
                "blockBypass": true,
                "categories": [
                    {"id": "ads", "active": false},
                    {"id": "social-networks", "active": true}
                ],
                "services": [{"id": "tiktok", "active": false}]
            },
            "denylist": [{"id": "bar.com", "active": false}],
            "privacy": {"disguisedTrackers": true}
        }"#;

        let profile: Profile = serde_json::from_str(doc).unwrap();
        assert_eq!(profile.name.as_deref(), Some("Home"));
        assert!(!profile.parental_control.safe_search);
        assert!(profile.parental_control.block_bypass);
        assert_eq!(
            profile.parental_control.entry_active(FilterKind::Category, "ads"),
            Some(false)
        );
        assert_eq!(
            profile.parental_control.entry_active(FilterKind::Service, "tiktok"),
            Some(false)
        );
        assert_eq!(profile.denylist_entry("bar.com").map(|e| e.active), Some(false));
        assert!(profile.denylist_entry("missing.com").is_none());
        assert_eq!(profile.privacy["disguisedTrackers"], true);
        // Blocks the document never mentioned default to null
        assert!(profile.security.is_null());
    }

    #[test]
    fn test_unknown_ids() {
        let control = ParentalControl {
            categories: vec![FilterEntry::new("ads", true)],
            services: vec![FilterEntry::new("tiktok", false)],
            ..Default::default()
        };

        let unknown = control.unknown_ids(
            FilterKind::Category,
            ["ads", "gaming", "dating"].into_iter(),
        );
        assert_eq!(unknown, vec!["gaming".to_string(), "dating".to_string()]);
        assert!(control.unknown_ids(FilterKind::Service, ["tiktok"].into_iter()).is_empty());
    }

    #[test]
    fn test_unknown_ids_message_names_everything() {
        let message = unknown_ids_message(
            &["gaming".to_string()],
            &["vimeo".to_string(), "zoom".to_string()],
        );
        assert_eq!(
            message,
            "unknown category ids: gaming; unknown service ids: vimeo, zoom"
        );
    }

    #[test]
    fn test_parental_patch_skips_absent_fields() {
        let patch = ParentalPatch {
            safe_search: Some(true),
            categories: vec![FilterEntry::new("ads", true)],
            ..Default::default()
        };

        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "safeSearch": true,
                "categories": [{"id": "ads", "active": true}]
            })
        );
        assert!(!patch.is_empty());
        assert!(ParentalPatch::default().is_empty());
    }

    #[test]
    fn test_filter_kind_parse() {
        assert_eq!(FilterKind::parse("categories"), Some(FilterKind::Category));
        assert_eq!(FilterKind::parse("service"), Some(FilterKind::Service));
        assert_eq!(FilterKind::parse("services"), Some(FilterKind::Service));
        assert_eq!(FilterKind::parse("cat"), None);
    }
}
