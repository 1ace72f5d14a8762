// Alarm endpoints

use crate::client::{Endpoint, FirewallaClient};
use crate::error::Error;
use crate::models::AlarmRecord;

impl FirewallaClient {
    /// List active alarms, scoped to the tracked box.
    ///
    /// `GET /v2/alarms?gid={gid}`
    pub async fn fetch_alarms(&self) -> Result<Vec<AlarmRecord>, Error> {
        let url = self.scoped_url("alarms").await?;
        self.get_list(Endpoint::Alarms, url).await
    }
}
