//! Core types for AgentHive.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Stable identifier of one piece of content: `@{author}/{permlink}`.
///
/// Author and permlink are both required to be non-empty. The permlink is
/// everything after the first `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentId(String);

impl ContentId {
    /// Build a content id from its parts.
    pub fn new(author: &str, permlink: &str) -> Self {
        ContentId(format!("@{}/{}", author, permlink))
    }

    /// Parse the literal `@author/permlink` form.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let rest = raw
            .strip_prefix('@')
            .ok_or_else(|| CoreError::InvalidContentId(raw.to_string()))?;
        match rest.split_once('/') {
            Some((author, permlink)) if !author.is_empty() && !permlink.is_empty() => {
                Ok(ContentId(raw.to_string()))
            }
            _ => Err(CoreError::InvalidContentId(raw.to_string())),
        }
    }

    /// Decode the URL-safe (base64url) form produced by [`ContentId::to_url_safe`].
    ///
    /// Padding is tolerated. The decoded text must itself be a literal content id.
    pub fn from_url_safe(encoded: &str) -> Result<Self, CoreError> {
        let trimmed = encoded.trim().trim_end_matches('=');
        let bytes = URL_SAFE_NO_PAD
            .decode(trimmed)
            .map_err(|e| CoreError::InvalidEncoding(e.to_string()))?;
        let text =
            String::from_utf8(bytes).map_err(|e| CoreError::InvalidEncoding(e.to_string()))?;
        Self::parse(&text)
    }

    /// Accept either the literal or the URL-safe form, as query parameters do.
    pub fn decode_param(raw: &str) -> Result<Self, CoreError> {
        let raw = raw.trim();
        if raw.starts_with('@') {
            Self::parse(raw)
        } else {
            Self::from_url_safe(raw)
        }
    }

    /// Reversible URL-safe encoding (base64url without padding).
    pub fn to_url_safe(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0.as_bytes())
    }

    /// Author part.
    pub fn author(&self) -> &str {
        self.split().0
    }

    /// Permlink part.
    pub fn permlink(&self) -> &str {
        self.split().1
    }

    /// Literal string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn split(&self) -> (&str, &str) {
        // Construction guarantees the leading '@' and a '/' separator.
        self.0[1..].split_once('/').unwrap_or((&self.0[1..], ""))
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for ContentId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ContentId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        ContentId::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Kind of payout run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutKind {
    /// Daily split of the participation pool by score.
    DailyParticipation,

    /// Weekly split of the curated pool by curator votes.
    WeeklyCurated,
}

impl PayoutKind {
    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutKind::DailyParticipation => "daily_participation",
            PayoutKind::WeeklyCurated => "weekly_curated",
        }
    }
}

impl std::str::FromStr for PayoutKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily_participation" => Ok(PayoutKind::DailyParticipation),
            "weekly_curated" => Ok(PayoutKind::WeeklyCurated),
            _ => Err(CoreError::UnknownPayoutKind(s.to_string())),
        }
    }
}

impl fmt::Display for PayoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a payout run: `planned -> executed | failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    /// Row created, computation not finished.
    Planned,

    /// Report written.
    Executed,

    /// Computation failed; report holds the error.
    Failed,
}

impl PayoutStatus {
    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Planned => "planned",
            PayoutStatus::Executed => "executed",
            PayoutStatus::Failed => "failed",
        }
    }

    /// Whether the run has reached a final state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PayoutStatus::Planned)
    }
}

impl std::str::FromStr for PayoutStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planned" => Ok(PayoutStatus::Planned),
            "executed" => Ok(PayoutStatus::Executed),
            "failed" => Ok(PayoutStatus::Failed),
            _ => Err(CoreError::UnknownPayoutStatus(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_id_parts() {
        let id = ContentId::new("alice", "my-first-post");
        assert_eq!(id.as_str(), "@alice/my-first-post");
        assert_eq!(id.author(), "alice");
        assert_eq!(id.permlink(), "my-first-post");
    }

    #[test]
    fn test_content_id_parse_rejects_malformed() {
        assert!(ContentId::parse("@alice/post").is_ok());
        assert!(ContentId::parse("alice/post").is_err());
        assert!(ContentId::parse("@alice").is_err());
        assert!(ContentId::parse("@/post").is_err());
        assert!(ContentId::parse("@alice/").is_err());
    }

    #[test]
    fn test_content_id_url_safe_form() {
        let id = ContentId::new("bob", "re-alice-2026?x=1/y");
        let encoded = id.to_url_safe();
        assert!(!encoded.contains('/'));
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('='));
        assert_eq!(ContentId::from_url_safe(&encoded).unwrap(), id);

        // Padded input is tolerated
        let padded = format!("{}==", encoded);
        assert_eq!(ContentId::from_url_safe(&padded).unwrap(), id);
    }

    #[test]
    fn test_decode_param_accepts_both_forms() {
        let id = ContentId::new("carol", "thread");
        assert_eq!(ContentId::decode_param("@carol/thread").unwrap(), id);
        assert_eq!(ContentId::decode_param(&id.to_url_safe()).unwrap(), id);

        // Encoded text that is not a content id is rejected
        let not_an_id = URL_SAFE_NO_PAD.encode("carol/thread");
        assert!(ContentId::decode_param(&not_an_id).is_err());
        assert!(ContentId::decode_param("%%%").is_err());
    }

    #[test]
    fn test_content_id_serde_validates() {
        let id: ContentId = serde_json::from_str("\"@dave/x\"").unwrap();
        assert_eq!(id.author(), "dave");
        assert!(serde_json::from_str::<ContentId>("\"dave/x\"").is_err());
    }

    #[test]
    fn test_payout_kind_and_status_strings() {
        assert_eq!(PayoutKind::DailyParticipation.as_str(), "daily_participation");
        assert_eq!(PayoutKind::WeeklyCurated.as_str(), "weekly_curated");
        assert_eq!(
            "weekly_curated".parse::<PayoutKind>().unwrap(),
            PayoutKind::WeeklyCurated
        );
        assert!("monthly".parse::<PayoutKind>().is_err());

        assert_eq!("planned".parse::<PayoutStatus>().unwrap(), PayoutStatus::Planned);
        assert_eq!("executed".parse::<PayoutStatus>().unwrap(), PayoutStatus::Executed);
        assert_eq!("failed".parse::<PayoutStatus>().unwrap(), PayoutStatus::Failed);
        assert!(!PayoutStatus::Planned.is_terminal());
        assert!(PayoutStatus::Failed.is_terminal());
    }
}
