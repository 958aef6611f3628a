//! Canonical constants for AgentHive.
//!
//! These values are part of the on-ledger convention that posting tools and
//! the indexer share. Changing them changes which content is indexed.

/// Application id a post declares in its `json_metadata.app` field.
pub const APP_ID: &str = "agenthive/1.0";

/// Default tag whitelist used when tag acceptance is enabled.
pub const DEFAULT_TAG: &str = "agenthive";

/// Ledger identity whose balance is unspendable (auto-burn sink).
pub const BURN_SINK_ACCOUNT: &str = "null";

/// Beneficiary weights are expressed in basis points of this total.
pub const FULL_WEIGHT_BPS: u64 = 10_000;

/// Ledger operation carrying a post or reply.
pub const OP_COMMENT: &str = "comment";

/// Ledger operation carrying payout options for a comment.
pub const OP_COMMENT_OPTIONS: &str = "comment_options";

/// Extension tag inside `comment_options` listing payout beneficiaries.
pub const EXT_BENEFICIARIES: &str = "comment_payout_beneficiaries";

/// Front-end used to build canonical content URLs.
pub const CONTENT_URL_BASE: &str = "https://peakd.com";

/// Build the canonical URL for a piece of content.
pub fn content_url(author: &str, permlink: &str) -> String {
    format!("{}/@{}/{}", CONTENT_URL_BASE, author, permlink)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_url() {
        assert_eq!(
            content_url("alice", "hello-world"),
            "https://peakd.com/@alice/hello-world"
        );
    }
}
