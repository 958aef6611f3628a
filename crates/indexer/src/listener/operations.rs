//! Comment operation filtering and field extraction.
//!
//! Decides which ledger comments belong to AgentHive (inclusion policy),
//! whether they carry the auto-burn beneficiary setting, and turns them into
//! [`ContentRecord`]s.

use agenthive_core::{
    content_url, ContentId, APP_ID, BURN_SINK_ACCOUNT, EXT_BENEFICIARIES, FULL_WEIGHT_BPS,
    OP_COMMENT_OPTIONS,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::client::LedgerTransaction;
use crate::config::PolicyConfig;
use crate::storage::ContentRecord;

/// Body of a `comment` operation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CommentOp {
    pub author: String,
    pub permlink: String,
    #[serde(default)]
    pub parent_author: String,
    #[serde(default)]
    pub parent_permlink: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub json_metadata: String,
}

/// One beneficiary route on a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Beneficiary {
    pub account: String,
    pub weight: u64,
}

/// Outcome of the auto-burn check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BurnCheck {
    /// Enforcement is off; everything passes.
    NotEnforced,
    /// Exactly one beneficiary, the burn sink, at full weight.
    Valid,
    /// No companion `comment_options` in the transaction.
    MissingOptions,
    /// Options found but the beneficiaries do not burn the full payout.
    Invalid {
        beneficiaries: Vec<Beneficiary>,
        total_weight: u64,
    },
}

impl BurnCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, BurnCheck::NotEnforced | BurnCheck::Valid)
    }
}

/// Split an operation into `(type, body)`.
///
/// Accepts the condenser array form `["comment", {...}]` and the tagged
/// object form `{"type": "comment_operation", "value": {...}}`.
pub fn as_operation(op: &Value) -> Option<(&str, &Value)> {
    let (kind, body) = as_tagged(op)?;
    Some((kind.strip_suffix("_operation").unwrap_or(kind), body))
}

fn as_tagged(value: &Value) -> Option<(&str, &Value)> {
    match value {
        Value::Array(pair) if pair.len() >= 2 => Some((pair[0].as_str()?, &pair[1])),
        Value::Object(map) => Some((map.get("type")?.as_str()?, map.get("value")?)),
        _ => None,
    }
}

/// Parse `json_metadata`; anything that is not a JSON object becomes `{}`.
pub fn parse_metadata(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => value,
        _ => Value::Object(Default::default()),
    }
}

/// String entries of `metadata.tags`, in order.
pub fn extract_tags(metadata: &Value) -> Vec<String> {
    metadata
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn metadata_str<'a>(metadata: &'a Value, pointer: &str) -> Option<&'a str> {
    metadata
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Whether a comment with this metadata is indexed.
pub fn is_included(metadata: &Value, policy: &PolicyConfig) -> bool {
    if metadata_str(metadata, "/app") == Some(APP_ID) {
        return true;
    }
    if !policy.accept_tags {
        return false;
    }
    extract_tags(metadata)
        .iter()
        .any(|tag| policy.tag_whitelist.contains(tag))
}

/// Check the auto-burn setting of `comment` against its own transaction.
pub fn check_auto_burn(comment: &CommentOp, tx: &LedgerTransaction, policy: &PolicyConfig) -> BurnCheck {
    if !policy.auto_burn_enforced {
        return BurnCheck::NotEnforced;
    }

    let options = tx.operations.iter().filter_map(as_operation).find(|(kind, body)| {
        *kind == OP_COMMENT_OPTIONS
            && body.get("author").and_then(Value::as_str) == Some(comment.author.as_str())
            && body.get("permlink").and_then(Value::as_str) == Some(comment.permlink.as_str())
    });

    let Some((_, options)) = options else {
        return BurnCheck::MissingOptions;
    };

    let beneficiaries = beneficiaries(options);
    let total_weight: u64 = beneficiaries.iter().map(|b| b.weight).sum();

    match beneficiaries.as_slice() {
        [only] if only.account == BURN_SINK_ACCOUNT && only.weight == FULL_WEIGHT_BPS => BurnCheck::Valid,
        _ => BurnCheck::Invalid {
            beneficiaries,
            total_weight,
        },
    }
}

/// Beneficiary extension entries of a `comment_options` body.
///
/// The extension is tagged either by name or by its variant index `0`.
fn beneficiaries(options: &Value) -> Vec<Beneficiary> {
    options
        .get("extensions")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(beneficiary_extension)
        .filter_map(|ext| ext.get("beneficiaries").and_then(Value::as_array))
        .flatten()
        .map(|entry| Beneficiary {
            account: entry
                .get("account")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            weight: entry.get("weight").and_then(Value::as_u64).unwrap_or(0),
        })
        .collect()
}

fn beneficiary_extension(ext: &Value) -> Option<&Value> {
    match ext {
        Value::Array(pair) if pair.len() >= 2 => {
            let named = pair[0].as_str() == Some(EXT_BENEFICIARIES);
            let indexed = pair[0].as_u64() == Some(0);
            (named || indexed).then_some(&pair[1])
        }
        Value::Object(_) => {
            let (kind, value) = as_tagged(ext)?;
            (kind == EXT_BENEFICIARIES).then_some(value)
        }
        _ => None,
    }
}

/// Lowercase hex SHA-256 of `body`.
pub fn body_hash(body: &str) -> String {
    hex::encode(Sha256::digest(body.as_bytes()))
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Build the stored row for an included comment.
pub fn build_content_record(
    comment: &CommentOp,
    metadata: Value,
    created_at: i64,
    burn_valid: bool,
) -> ContentRecord {
    let tags = extract_tags(&metadata);
    let app = metadata_str(&metadata, "/app").map(str::to_string);
    let agent_kind = metadata_str(&metadata, "/agent/kind").map(str::to_string);

    ContentRecord {
        content_id: ContentId::new(&comment.author, &comment.permlink),
        author: comment.author.clone(),
        permlink: comment.permlink.clone(),
        parent_author: non_empty(&comment.parent_author),
        parent_permlink: non_empty(&comment.parent_permlink),
        created_at,
        title: non_empty(&comment.title),
        body: non_empty(&comment.body),
        body_hash: body_hash(&comment.body),
        json_metadata: metadata,
        tags,
        app,
        agent_kind,
        url: content_url(&comment.author, &comment.permlink),
        burn_valid: Some(burn_valid),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn policy(accept_tags: bool, enforced: bool) -> PolicyConfig {
        PolicyConfig {
            accept_tags,
            tag_whitelist: vec!["agenthive".to_string()],
            auto_burn_enforced: enforced,
        }
    }

    fn comment(author: &str, permlink: &str) -> CommentOp {
        CommentOp {
            author: author.to_string(),
            permlink: permlink.to_string(),
            body: "hello".to_string(),
            json_metadata: json!({"app": "agenthive/1.0"}).to_string(),
            ..CommentOp::default()
        }
    }

    fn options(author: &str, permlink: &str, beneficiaries: Value) -> Value {
        json!(["comment_options", {
            "author": author,
            "permlink": permlink,
            "max_accepted_payout": "1000000.000 HBD",
            "percent_hbd": 10000,
            "allow_votes": true,
            "allow_curation_rewards": true,
            "extensions": [["comment_payout_beneficiaries", {"beneficiaries": beneficiaries}]]
        }])
    }

    fn tx_with(ops: Vec<Value>) -> LedgerTransaction {
        LedgerTransaction { operations: ops }
    }

    #[test]
    fn test_as_operation_forms() {
        let array = json!(["comment", {"author": "a"}]);
        let (kind, body) = as_operation(&array).unwrap();
        assert_eq!(kind, "comment");
        assert_eq!(body["author"], "a");

        let tagged = json!({"type": "comment_operation", "value": {"author": "b"}});
        let (kind, body) = as_operation(&tagged).unwrap();
        assert_eq!(kind, "comment");
        assert_eq!(body["author"], "b");

        assert!(as_operation(&json!(["comment"])).is_none());
        assert!(as_operation(&json!("comment")).is_none());
    }

    #[test]
    fn test_parse_metadata_tolerates_garbage() {
        assert_eq!(parse_metadata(r#"{"app":"x"}"#), json!({"app": "x"}));
        assert_eq!(parse_metadata("not json"), json!({}));
        assert_eq!(parse_metadata(""), json!({}));
        assert_eq!(parse_metadata("[1,2]"), json!({}));
        assert_eq!(parse_metadata("null"), json!({}));
    }

    #[test]
    fn test_extract_tags_drops_non_strings() {
        let meta = json!({"tags": ["agenthive", 7, null, "ai"]});
        assert_eq!(extract_tags(&meta), vec!["agenthive", "ai"]);
        assert!(extract_tags(&json!({"tags": "agenthive"})).is_empty());
    }

    #[test]
    fn test_inclusion_policy() {
        let app = json!({"app": "agenthive/1.0"});
        let tagged = json!({"app": "peakd/2024", "tags": ["agenthive"]});
        let other = json!({"app": "peakd/2024", "tags": ["photography"]});

        assert!(is_included(&app, &policy(false, false)));
        assert!(is_included(&app, &policy(true, false)));

        assert!(!is_included(&tagged, &policy(false, false)));
        assert!(is_included(&tagged, &policy(true, false)));

        assert!(!is_included(&other, &policy(true, false)));
        assert!(!is_included(&json!({}), &policy(true, false)));
    }

    #[test]
    fn test_auto_burn_valid() {
        let c = comment("alice", "post");
        let tx = tx_with(vec![
            json!(["comment", {}]),
            options("alice", "post", json!([{"account": "null", "weight": 10000}])),
        ]);
        assert_eq!(check_auto_burn(&c, &tx, &policy(false, true)), BurnCheck::Valid);
    }

    #[test]
    fn test_auto_burn_rejections() {
        let c = comment("alice", "post");
        let enforced = policy(false, true);

        let partial = tx_with(vec![options(
            "alice",
            "post",
            json!([{"account": "null", "weight": 9000}]),
        )]);
        assert_eq!(
            check_auto_burn(&c, &partial, &enforced),
            BurnCheck::Invalid {
                beneficiaries: vec![Beneficiary {
                    account: "null".to_string(),
                    weight: 9000
                }],
                total_weight: 9000,
            }
        );

        let extra = tx_with(vec![options(
            "alice",
            "post",
            json!([{"account": "null", "weight": 10000}, {"account": "bob", "weight": 0}]),
        )]);
        assert!(!check_auto_burn(&c, &extra, &enforced).is_valid());

        let wrong_sink = tx_with(vec![options(
            "alice",
            "post",
            json!([{"account": "bob", "weight": 10000}]),
        )]);
        assert!(!check_auto_burn(&c, &wrong_sink, &enforced).is_valid());

        let other_post = tx_with(vec![options(
            "alice",
            "another-post",
            json!([{"account": "null", "weight": 10000}]),
        )]);
        assert_eq!(
            check_auto_burn(&c, &other_post, &enforced),
            BurnCheck::MissingOptions
        );

        assert_eq!(
            check_auto_burn(&c, &tx_with(vec![]), &enforced),
            BurnCheck::MissingOptions
        );

        let no_extensions = tx_with(vec![json!(["comment_options", {"author": "alice", "permlink": "post"}])]);
        assert_eq!(
            check_auto_burn(&c, &no_extensions, &enforced),
            BurnCheck::Invalid {
                beneficiaries: vec![],
                total_weight: 0
            }
        );
    }

    #[test]
    fn test_auto_burn_accepts_indexed_and_tagged_extensions() {
        let c = comment("alice", "post");
        let enforced = policy(false, true);

        let indexed = tx_with(vec![json!(["comment_options", {
            "author": "alice",
            "permlink": "post",
            "extensions": [[0, {"beneficiaries": [{"account": "null", "weight": 10000}]}]]
        }])]);
        assert_eq!(check_auto_burn(&c, &indexed, &enforced), BurnCheck::Valid);

        let tagged = tx_with(vec![json!({
            "type": "comment_options_operation",
            "value": {
                "author": "alice",
                "permlink": "post",
                "extensions": [{
                    "type": "comment_payout_beneficiaries",
                    "value": {"beneficiaries": [{"account": "null", "weight": 10000}]}
                }]
            }
        })]);
        assert_eq!(check_auto_burn(&c, &tagged, &enforced), BurnCheck::Valid);
    }

    #[test]
    fn test_auto_burn_not_enforced_always_passes() {
        let c = comment("alice", "post");
        let tx = tx_with(vec![options(
            "alice",
            "post",
            json!([{"account": "bob", "weight": 5000}]),
        )]);
        let check = check_auto_burn(&c, &tx, &policy(false, false));
        assert_eq!(check, BurnCheck::NotEnforced);
        assert!(check.is_valid());
    }

    #[test]
    fn test_build_content_record() {
        let op = CommentOp {
            author: "alice".to_string(),
            permlink: "re-bob".to_string(),
            parent_author: "bob".to_string(),
            parent_permlink: "root".to_string(),
            title: String::new(),
            body: "hello".to_string(),
            json_metadata: String::new(),
        };
        let meta = json!({
            "app": "agenthive/1.0",
            "tags": ["agenthive"],
            "agent": {"kind": "assistant"}
        });

        let record = build_content_record(&op, meta.clone(), 1_769_904_000, false);
        assert_eq!(record.content_id.as_str(), "@alice/re-bob");
        assert_eq!(record.parent_author.as_deref(), Some("bob"));
        assert!(!record.is_root());
        assert_eq!(record.title, None);
        assert_eq!(record.body.as_deref(), Some("hello"));
        assert_eq!(
            record.body_hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(record.tags, vec!["agenthive"]);
        assert_eq!(record.app.as_deref(), Some("agenthive/1.0"));
        assert_eq!(record.agent_kind.as_deref(), Some("assistant"));
        assert_eq!(record.url, "https://peakd.com/@alice/re-bob");
        assert_eq!(record.burn_valid, Some(false));
        assert_eq!(record.json_metadata, meta);
    }

    #[test]
    fn test_empty_body_hash() {
        assert_eq!(
            body_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
