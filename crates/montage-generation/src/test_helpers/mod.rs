//! Test helpers for generation unit and integration tests
//!
//! In-memory asset store, task queue, storage and publisher, plus fixtures and a
//! builder that wires them into [`GenerationServices`](crate::GenerationServices).
//! No database or object store is needed.

pub mod fixtures;
pub mod mock_repositories;
pub mod mock_storage;

pub use fixtures::*;
pub use mock_repositories::{EnqueuedTask, InMemoryAssetStore, RecordingEnqueuer, RecordingPublisher};
pub use mock_storage::MemoryStorage;

use std::sync::Arc;

use montage_core::config::GenerationSettings;
use montage_core::models::{AiModel, Provider};
use montage_core::registry::ModelCatalog;

use crate::client::ProviderClient;
use crate::notifier::Notifier;
use crate::services::GenerationServices;

/// Builds [`GenerationServices`] over in-memory doubles and keeps handles to them.
pub struct TestServices {
    pub assets: Arc<InMemoryAssetStore>,
    pub queue: Arc<RecordingEnqueuer>,
    pub storage: Arc<MemoryStorage>,
    pub publisher: Arc<RecordingPublisher>,
    pub services: GenerationServices,
}

impl TestServices {
    pub fn new(providers: Vec<Provider>, models: Vec<AiModel>) -> Self {
        Self::with_settings(providers, models, GenerationSettings::default())
    }

    pub fn with_settings(
        providers: Vec<Provider>,
        models: Vec<AiModel>,
        settings: GenerationSettings,
    ) -> Self {
        let assets = Arc::new(InMemoryAssetStore::new());
        let queue = Arc::new(RecordingEnqueuer::new());
        let storage = Arc::new(MemoryStorage::new());
        let publisher = Arc::new(RecordingPublisher::default());

        let services = GenerationServices {
            assets: assets.clone(),
            registry: Arc::new(ModelCatalog::new(providers, models)),
            queue: queue.clone(),
            storage: storage.clone(),
            notifier: Notifier::new(publisher.clone()),
            client: ProviderClient::new(settings).expect("http client"),
        };

        Self {
            assets,
            queue,
            storage,
            publisher,
            services,
        }
    }
}
