//! Test fixtures

use chrono::Utc;
use montage_core::models::{
    AiModel, Asset, AssetStatus, AssetType, ModelKind, Provider, SourceType, Task, TaskStatus,
    TaskType,
};
use serde_json::Value;
use uuid::Uuid;

pub fn fixture_provider(base_url: &str, api_key: &str) -> Provider {
    let now = Utc::now();
    Provider {
        id: Uuid::new_v4(),
        name: "Kie.ai".to_string(),
        base_url: base_url.to_string(),
        api_key: api_key.to_string(),
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

/// A video model with a random provider id. Use [`fixture_model_for`] to attach it.
pub fn fixture_model(api_endpoint: &str, request_template: Value) -> AiModel {
    let now = Utc::now();
    AiModel {
        id: Uuid::new_v4(),
        provider_id: Uuid::new_v4(),
        name: "Seedance 1.5 Pro".to_string(),
        kind: ModelKind::Video,
        api_endpoint: api_endpoint.to_string(),
        request_template,
        parameters_schema: Value::Object(Default::default()),
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

pub fn fixture_model_for(provider: &Provider, api_endpoint: &str, request_template: Value) -> AiModel {
    AiModel {
        provider_id: provider.id,
        ..fixture_model(api_endpoint, request_template)
    }
}

pub fn fixture_asset(status: AssetStatus) -> Asset {
    let now = Utc::now();
    Asset {
        id: Uuid::new_v4(),
        scene_id: Uuid::new_v4(),
        asset_type: AssetType::Video,
        file_url: None,
        thumbnail_url: None,
        prompt_text: Some("a cat surfing at sunset".to_string()),
        ai_model_id: None,
        generation_config: Value::Object(Default::default()),
        seed: None,
        status,
        error_message: None,
        source_type: SourceType::Generated,
        parent_asset_id: None,
        external_task_id: None,
        created_at: now,
        updated_at: now,
    }
}

/// A claimed task invocation with `retry_count` retries already spent.
pub fn fixture_task(task_type: TaskType, payload: Value, retry_count: i32, max_retries: i32) -> Task {
    let now = Utc::now();
    let asset_id = payload
        .get("asset_id")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);
    Task {
        id: Uuid::new_v4(),
        task_type,
        asset_id,
        status: TaskStatus::Running,
        payload,
        result: None,
        scheduled_at: now,
        started_at: Some(now),
        completed_at: None,
        retry_count,
        max_retries,
        last_error: None,
        created_at: now,
        updated_at: now,
    }
}
