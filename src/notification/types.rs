use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::validation::ValidationError;

/// Maximum number of device tokens addressed by a single request
pub const MAX_TARGETS: usize = 500;

/// Maximum title length in characters
pub const MAX_TITLE_CHARS: usize = 100;

/// Maximum body length in characters
pub const MAX_BODY_CHARS: usize = 1000;

/// Data keys injected by the dispatcher into repeated data messages
pub const MESSAGE_INDEX_KEY: &str = "messageIndex";
pub const TIMESTAMP_KEY: &str = "timestamp";

const RESERVED_DATA_KEYS: &[&str] = &["from", "notification", "message_type"];
const RESERVED_DATA_PREFIXES: &[&str] = &["google.", "gcm."];

/// User-visible notification content.
///
/// Only constructible through [`NotificationContent::new`], so a value of this
/// type always satisfies the length limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationContent {
    title: String,
    body: String,
    #[serde(rename = "image", skip_serializing_if = "Option::is_none")]
    image_url: Option<String>,
}

impl NotificationContent {
    pub fn new(
        title: impl Into<String>,
        body: impl Into<String>,
        image_url: Option<String>,
    ) -> Result<Self, ValidationError> {
        let title = title.into();
        let body = body.into();

        if title.is_empty() || body.is_empty() {
            return Err(ValidationError::NotificationFieldsRequired);
        }
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(ValidationError::TitleTooLong);
        }
        if body.chars().count() > MAX_BODY_CHARS {
            return Err(ValidationError::BodyTooLong);
        }

        Ok(Self {
            title,
            body,
            image_url: image_url.filter(|url| !url.is_empty()),
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }
}

/// String-to-string data payload delivered to the app.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DataPayload(BTreeMap<String, String>);

impl DataPayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a payload from caller-supplied JSON, coercing every value to a string.
    pub fn from_json(map: &serde_json::Map<String, serde_json::Value>) -> Result<Self, ValidationError> {
        let mut entries = BTreeMap::new();
        for (key, value) in map {
            if is_reserved_key(key) {
                return Err(ValidationError::ReservedDataKey(key.clone()));
            }
            entries.insert(key.clone(), coerce_to_string(value));
        }
        Ok(Self(entries))
    }

    /// Insert or overwrite a key
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Return a copy with `key` set to `value`
    pub fn with(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut payload = self.clone();
        payload.insert(key, value);
        payload
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

fn is_reserved_key(key: &str) -> bool {
    RESERVED_DATA_KEYS.contains(&key)
        || RESERVED_DATA_PREFIXES
            .iter()
            .any(|prefix| key.starts_with(prefix))
}

fn coerce_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Ordered set of device tokens addressed by one request.
///
/// The order is the index basis for correlating per-target provider results
/// back to tokens, so it is never changed after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TargetSet(Vec<String>);

impl TargetSet {
    pub fn new(tokens: Vec<String>) -> Result<Self, ValidationError> {
        if tokens.is_empty() {
            return Err(ValidationError::TokensRequired);
        }
        if tokens.len() > MAX_TARGETS {
            return Err(ValidationError::TooManyTokens);
        }
        if tokens.iter().any(|token| token.trim().is_empty()) {
            return Err(ValidationError::MalformedToken);
        }
        Ok(Self(tokens))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }
}

/// A messaging topic name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic(String);

impl Topic {
    const PREFIX: &'static str = "/topics/";

    /// Accepts `news` as well as `/topics/news`
    pub fn new(name: &str) -> Result<Self, ValidationError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::TopicRequired);
        }

        let bare = trimmed.strip_prefix(Self::PREFIX).unwrap_or(trimmed);
        let well_formed = !bare.is_empty()
            && bare
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~' | '%'));
        if !well_formed {
            return Err(ValidationError::InvalidTopic);
        }

        Ok(Self(bare.to_string()))
    }

    /// Bare topic name, as used in message addressing
    pub fn name(&self) -> &str {
        &self.0
    }

    /// `/topics/<name>`, as used by topic management
    pub fn path(&self) -> String {
        format!("{}{}", Self::PREFIX, self.0)
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Delivery priority for silent data messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Wake the app immediately (default for data-only messages)
    #[default]
    High,
    /// Let the platform batch delivery
    Normal,
}

impl Priority {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Priority::High),
            "normal" => Some(Priority::Normal),
            _ => None,
        }
    }

    /// Value of the `apns-priority` header
    pub fn apns_priority(&self) -> &'static str {
        match self {
            Priority::High => "10",
            Priority::Normal => "5",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_notification_content_limits() {
        assert!(NotificationContent::new("a".repeat(100), "b".repeat(1000), None).is_ok());
        assert_eq!(
            NotificationContent::new("a".repeat(101), "b", None),
            Err(ValidationError::TitleTooLong)
        );
        assert_eq!(
            NotificationContent::new("a", "b".repeat(1001), None),
            Err(ValidationError::BodyTooLong)
        );
        assert_eq!(
            NotificationContent::new("", "b", None),
            Err(ValidationError::NotificationFieldsRequired)
        );
    }

    #[test]
    fn test_title_counts_characters_not_bytes() {
        // 100 multi-byte characters are still within the limit
        assert!(NotificationContent::new("é".repeat(100), "body", None).is_ok());
    }

    #[test]
    fn test_notification_serializes_image() {
        let content =
            NotificationContent::new("Hi", "there", Some("https://x/img.png".into())).unwrap();
        let value = serde_json::to_value(&content).unwrap();
        assert_eq!(
            value,
            json!({"title": "Hi", "body": "there", "image": "https://x/img.png"})
        );
    }

    #[test]
    fn test_data_payload_coercion() {
        let map = json!({"s": "text", "n": 42, "f": 1.5, "b": true, "z": null, "o": {"k": [1]}});
        let payload = DataPayload::from_json(map.as_object().unwrap()).unwrap();

        assert_eq!(payload.get("s"), Some("text"));
        assert_eq!(payload.get("n"), Some("42"));
        assert_eq!(payload.get("f"), Some("1.5"));
        assert_eq!(payload.get("b"), Some("true"));
        assert_eq!(payload.get("z"), Some(""));
        assert_eq!(payload.get("o"), Some(r#"{"k":[1]}"#));
    }

    #[test]
    fn test_data_payload_reserved_keys() {
        let map = json!({"google.foo": "x"});
        assert_eq!(
            DataPayload::from_json(map.as_object().unwrap()),
            Err(ValidationError::ReservedDataKey("google.foo".into()))
        );

        let map = json!({"from": "x"});
        assert!(DataPayload::from_json(map.as_object().unwrap()).is_err());
    }

    #[test]
    fn test_data_payload_with_overwrites() {
        let mut payload = DataPayload::new();
        payload.insert("messageIndex", "caller");
        let injected = payload.with(MESSAGE_INDEX_KEY, "1");
        assert_eq!(injected.get(MESSAGE_INDEX_KEY), Some("1"));
        assert_eq!(payload.get(MESSAGE_INDEX_KEY), Some("caller"));
    }

    #[test]
    fn test_target_set_bounds() {
        assert!(TargetSet::new(vec!["a".into()]).is_ok());
        assert!(TargetSet::new(vec!["t".into(); 500]).is_ok());
        assert_eq!(TargetSet::new(vec![]), Err(ValidationError::TokensRequired));
        assert_eq!(
            TargetSet::new(vec!["t".into(); 501]),
            Err(ValidationError::TooManyTokens)
        );
        assert_eq!(
            TargetSet::new(vec!["a".into(), "   ".into()]),
            Err(ValidationError::MalformedToken)
        );
    }

    #[test]
    fn test_target_set_preserves_order() {
        let set = TargetSet::new(vec!["c".into(), "a".into(), "b".into()]).unwrap();
        assert_eq!(set.get(0), Some("c"));
        assert_eq!(set.get(2), Some("b"));
    }

    #[test]
    fn test_topic_names() {
        assert_eq!(Topic::new("news").unwrap().name(), "news");
        assert_eq!(Topic::new("/topics/news").unwrap().name(), "news");
        assert_eq!(Topic::new("news").unwrap().path(), "/topics/news");
        assert_eq!(Topic::new("  "), Err(ValidationError::TopicRequired));
        assert_eq!(Topic::new("bad topic!"), Err(ValidationError::InvalidTopic));
        assert_eq!(Topic::new("/topics/"), Err(ValidationError::InvalidTopic));
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!(Priority::parse("HIGH"), Some(Priority::High));
        assert_eq!(Priority::parse("normal"), Some(Priority::Normal));
        assert_eq!(Priority::parse("urgent"), None);
        assert_eq!(Priority::default().apns_priority(), "10");
        assert_eq!(Priority::Normal.apns_priority(), "5");
    }
}
