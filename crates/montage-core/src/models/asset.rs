use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

/// Generation lifecycle status of an asset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "text", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum AssetStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl AssetStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AssetStatus::Completed | AssetStatus::Failed)
    }

    /// Upper-case label used in status events.
    pub fn event_label(&self) -> &'static str {
        match self {
            AssetStatus::Pending => "PENDING",
            AssetStatus::Processing => "PROCESSING",
            AssetStatus::Completed => "COMPLETED",
            AssetStatus::Failed => "FAILED",
        }
    }
}

impl Display for AssetStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            AssetStatus::Pending => write!(f, "pending"),
            AssetStatus::Processing => write!(f, "processing"),
            AssetStatus::Completed => write!(f, "completed"),
            AssetStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for AssetStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(AssetStatus::Pending),
            "processing" => Ok(AssetStatus::Processing),
            "completed" => Ok(AssetStatus::Completed),
            "failed" => Ok(AssetStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid asset status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "text", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    Image,
    Video,
}

impl Display for AssetType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            AssetType::Image => write!(f, "image"),
            AssetType::Video => write!(f, "video"),
        }
    }
}

/// How an asset came to exist.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "text", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Generated,
    Uploaded,
    #[cfg_attr(feature = "sqlx", sqlx(rename = "img2vid"))]
    #[serde(rename = "img2vid")]
    Img2Vid,
}

impl Display for SourceType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            SourceType::Generated => write!(f, "generated"),
            SourceType::Uploaded => write!(f, "uploaded"),
            SourceType::Img2Vid => write!(f, "img2vid"),
        }
    }
}

/// A generated or uploaded media item under a scene.
///
/// `external_task_id` is set once the provider accepted the job; `file_url` is set only
/// once the asset is completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Asset {
    pub id: Uuid,
    pub scene_id: Uuid,
    pub asset_type: AssetType,
    pub file_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub prompt_text: Option<String>,
    pub ai_model_id: Option<Uuid>,
    pub generation_config: serde_json::Value,
    pub seed: Option<i32>,
    pub status: AssetStatus,
    pub error_message: Option<String>,
    pub source_type: SourceType,
    pub parent_asset_id: Option<Uuid>,
    pub external_task_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Asset {
    /// A dispatch may only start from a fresh asset that has never been accepted by a provider.
    pub fn is_dispatchable(&self) -> bool {
        self.status == AssetStatus::Pending
            && self
                .external_task_id
                .as_deref()
                .map(str::is_empty)
                .unwrap_or(true)
    }

    pub fn external_task_id(&self) -> Option<&str> {
        self.external_task_id.as_deref().filter(|id| !id.is_empty())
    }
}

/// An asset together with what the generation core needs from its surroundings.
#[derive(Debug, Clone)]
pub struct GenerationTarget {
    pub asset: Asset,
    /// Owning project, used as the notification group.
    pub project_id: Uuid,
    /// Stored file location of the parent asset, if any.
    pub parent_file_url: Option<String>,
}
