use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::asset::{Asset, AssetStatus};

pub const ASSET_STATUS_CHANGED: &str = "asset_status_changed";

/// Status change broadcast to observers of a project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssetStatusEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub asset_id: Uuid,
    /// Upper-case status label, e.g. `COMPLETED`.
    pub status: String,
    pub file_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub error_message: Option<String>,
}

impl AssetStatusEvent {
    pub fn new(
        asset_id: Uuid,
        status: AssetStatus,
        file_url: Option<String>,
        error_message: Option<String>,
    ) -> Self {
        Self {
            event_type: ASSET_STATUS_CHANGED.to_string(),
            asset_id,
            status: status.event_label().to_string(),
            file_url,
            thumbnail_url: None,
            error_message,
        }
    }

    pub fn from_asset(asset: &Asset) -> Self {
        Self {
            thumbnail_url: asset.thumbnail_url.clone(),
            ..Self::new(
                asset.id,
                asset.status,
                asset.file_url.clone(),
                asset.error_message.clone(),
            )
        }
    }
}

/// Notification group for a project.
pub fn project_group(project_id: Uuid) -> String {
    format!("project_{}", project_id)
}
