// Device endpoints

use crate::client::{Endpoint, FirewallaClient};
use crate::error::Error;
use crate::models::NetworkDevice;

impl FirewallaClient {
    /// List client devices, scoped to the tracked box.
    ///
    /// `GET /v2/devices?gid={gid}`
    pub async fn fetch_devices(&self) -> Result<Vec<NetworkDevice>, Error> {
        let url = self.scoped_url("devices").await?;
        self.get_list(Endpoint::Devices, url).await
    }
}
