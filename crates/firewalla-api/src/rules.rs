// Rule endpoints
//
// Listing plus the two control actions. Pause and resume are idempotent on
// the remote side, so they go through the same transient retry as reads.

use tracing::debug;

use crate::client::{Endpoint, FirewallaClient};
use crate::error::Error;
use crate::models::RuleRecord;

impl FirewallaClient {
    /// List rules, scoped to the tracked box.
    ///
    /// `GET /v2/rules?gid={gid}`. The payload may be a bare array or an
    /// object envelope.
    pub async fn fetch_rules(&self) -> Result<Vec<RuleRecord>, Error> {
        let url = self.scoped_url("rules").await?;
        self.get_list(Endpoint::Rules, url).await
    }

    /// Pause a rule.
    ///
    /// `POST /v2/rules/{id}/pause`
    pub async fn pause_rule(&self, rule_id: &str) -> Result<(), Error> {
        let url = self.rule_action_url(rule_id, "pause")?;
        debug!(rule_id, "pausing rule");
        self.post_action(url, "pause rule").await
    }

    /// Resume a paused rule.
    ///
    /// `POST /v2/rules/{id}/resume`
    pub async fn resume_rule(&self, rule_id: &str) -> Result<(), Error> {
        let url = self.rule_action_url(rule_id, "resume")?;
        debug!(rule_id, "resuming rule");
        self.post_action(url, "resume rule").await
    }

    fn rule_action_url(&self, rule_id: &str, action: &str) -> Result<url::Url, Error> {
        let mut url = self.api_url("rules")?;
        url.path_segments_mut()
            .map_err(|()| Error::UnexpectedPayload("base URL cannot carry a path".into()))?
            .push(rule_id)
            .push(action);
        Ok(url)
    }
}
