// Cloud account/device endpoints

use tracing::debug;

use crate::cloud::client::CloudClient;
use crate::cloud::models::{CloudDevice, CurrentScreen, DeviceList};
use crate::error::Error;

impl CloudClient {
    /// What the device is currently showing.
    ///
    /// `GET /api/current_screen` (device-scoped via the `ID` header)
    pub async fn current_screen(&self) -> Result<CurrentScreen, Error> {
        debug!("fetching current screen");
        self.get("api/current_screen").await
    }

    /// List every device owned by the account.
    ///
    /// `GET /api/devices`
    pub async fn list_devices(&self) -> Result<Vec<CloudDevice>, Error> {
        debug!("listing account devices");
        let list: DeviceList = self.get("api/devices").await?;
        Ok(list.into_vec())
    }
}
