// Box endpoints
//
// `GET /v2/boxes` lists every box the MSP token can see; the client reduces
// it to the one box this session tracks. Accounts with several boxes track
// one box per client; pick it with `with_box_gid`.

use tracing::debug;

use crate::client::{Endpoint, FirewallaClient};
use crate::error::Error;
use crate::models::BoxInfo;

impl FirewallaClient {
    /// List all boxes visible to the token.
    ///
    /// `GET /v2/boxes`
    pub async fn list_boxes(&self) -> Result<Vec<BoxInfo>, Error> {
        let url = self.api_url("boxes")?;
        self.get_list(Endpoint::Boxes, url).await
    }

    /// Status of the tracked box.
    ///
    /// Picks the configured gid, or the first box when none is configured.
    /// That first-box choice sticks for the client's lifetime, so list
    /// scoping and box status never drift apart. A tracked gid that is
    /// absent is `NotFound`; an empty list is an unusable payload.
    pub async fn fetch_box_status(&self) -> Result<BoxInfo, Error> {
        let boxes = self.list_boxes().await?;
        debug!(count = boxes.len(), "fetched boxes");

        let gid = self.tracked_gid_from(&boxes).await?;
        boxes
            .into_iter()
            .find(|b| b.gid == gid)
            .ok_or_else(|| Error::NotFound {
                resource: format!("box {gid}"),
            })
    }
}
