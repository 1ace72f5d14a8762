// ── Remote API seam ──
//
// The coordinator and the rule control service talk to the MSP API through
// this trait so the sync logic can run against an in-memory double.

use std::future::Future;

use firewalla_api::FirewallaClient;

use crate::error::CoreError;
use crate::model::{Alarm, BoxStatus, Device, EntityId, Rule};

/// Remote operations the sync core needs, already converted to domain types.
pub trait RemoteApi: Send + Sync + 'static {
    fn fetch_box_status(&self) -> impl Future<Output = Result<BoxStatus, CoreError>> + Send;

    fn fetch_devices(&self) -> impl Future<Output = Result<Vec<Device>, CoreError>> + Send;

    fn fetch_rules(&self) -> impl Future<Output = Result<Vec<Rule>, CoreError>> + Send;

    fn fetch_alarms(&self) -> impl Future<Output = Result<Vec<Alarm>, CoreError>> + Send;

    fn pause_rule(&self, id: &EntityId) -> impl Future<Output = Result<(), CoreError>> + Send;

    fn resume_rule(&self, id: &EntityId) -> impl Future<Output = Result<(), CoreError>> + Send;
}

/// Rewrite a bare "resource not found" into a rule-specific one.
fn rule_not_found(id: &EntityId, err: firewalla_api::Error) -> CoreError {
    if err.is_not_found() {
        CoreError::NotFound {
            entity_type: "Rule".into(),
            identifier: id.to_string(),
        }
    } else {
        err.into()
    }
}

impl RemoteApi for FirewallaClient {
    async fn fetch_box_status(&self) -> Result<BoxStatus, CoreError> {
        Ok(FirewallaClient::fetch_box_status(self).await?.into())
    }

    async fn fetch_devices(&self) -> Result<Vec<Device>, CoreError> {
        let raw = FirewallaClient::fetch_devices(self).await?;
        Ok(raw.into_iter().map(Device::from).collect())
    }

    async fn fetch_rules(&self) -> Result<Vec<Rule>, CoreError> {
        let raw = FirewallaClient::fetch_rules(self).await?;
        Ok(raw.into_iter().map(Rule::from).collect())
    }

    async fn fetch_alarms(&self) -> Result<Vec<Alarm>, CoreError> {
        let raw = FirewallaClient::fetch_alarms(self).await?;
        Ok(raw.into_iter().map(Alarm::from).collect())
    }

    async fn pause_rule(&self, id: &EntityId) -> Result<(), CoreError> {
        FirewallaClient::pause_rule(self, id.as_str())
            .await
            .map_err(|e| rule_not_found(id, e))
    }

    async fn resume_rule(&self, id: &EntityId) -> Result<(), CoreError> {
        FirewallaClient::resume_rule(self, id.as_str())
            .await
            .map_err(|e| rule_not_found(id, e))
    }
}
