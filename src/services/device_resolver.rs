use crate::domain::{NotificationCategory, PushTarget};
use crate::errors::StoreError;
use crate::repo::DeviceRegistry;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;

/// Registry lookups issued concurrently per resolve call
const LOOKUP_CONCURRENCY: usize = 16;

/// Maps users to the devices that accept a notification category
#[derive(Clone)]
pub struct DeviceResolver {
    registry: Arc<dyn DeviceRegistry>,
}

impl DeviceResolver {
    pub fn new(registry: Arc<dyn DeviceRegistry>) -> Self {
        Self { registry }
    }

    /// One target per active device of each user whose preference for
    /// `category` is enabled. Output is grouped by user in input order.
    pub async fn resolve(
        &self,
        user_ids: Vec<String>,
        category: NotificationCategory,
    ) -> Result<Vec<PushTarget>, StoreError> {
        let per_user: Vec<Vec<PushTarget>> = stream::iter(user_ids)
            .map(|user_id| {
                let registry = self.registry.clone();
                async move {
                    let devices = registry.active_devices(&user_id).await?;
                    Ok::<_, StoreError>(
                        devices
                            .into_iter()
                            .filter(|d| d.is_active && d.user_id == user_id)
                            .filter(|d| d.preferences.allows(category))
                            .map(PushTarget::from)
                            .collect::<Vec<_>>(),
                    )
                }
            })
            .buffered(LOOKUP_CONCURRENCY)
            .try_collect()
            .await?;

        Ok(per_user.into_iter().flatten().collect())
    }
}
