//! Provider/model catalog seeding
//!
//! Catalog files are JSON documents (see `demos/kie_catalog.json`). Credentials are
//! never stored in the file: each provider names the environment variable holding its
//! key. Seeding is idempotent; providers match by name and models by (provider, name).

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use montage_core::models::{CatalogSeed, ProviderSeed};
use montage_db::ProviderRepository;
use serde::Serialize;

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct SeedSummary {
    pub providers: usize,
    pub models: usize,
}

pub fn load_catalog(path: &Path) -> Result<CatalogSeed> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read catalog file {}", path.display()))?;
    let catalog: CatalogSeed = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid catalog file {}", path.display()))?;
    validate_catalog(&catalog)?;
    Ok(catalog)
}

pub fn validate_catalog(catalog: &CatalogSeed) -> Result<()> {
    let mut provider_names = HashSet::new();
    for provider in &catalog.providers {
        if !provider_names.insert(provider.name.as_str()) {
            bail!("Duplicate provider {}", provider.name);
        }
        if !(provider.base_url.starts_with("http://") || provider.base_url.starts_with("https://")) {
            bail!("Provider {} base_url must be an http(s) URL", provider.name);
        }

        let mut model_names = HashSet::new();
        for model in &provider.models {
            if !model_names.insert(model.name.as_str()) {
                bail!("Duplicate model {} for provider {}", model.name, provider.name);
            }
            if model.api_endpoint.trim().is_empty() {
                bail!("Model {} has an empty api_endpoint", model.name);
            }
            if !model.request_template.is_object() {
                bail!("Model {} request_template must be a JSON object", model.name);
            }
        }
    }
    Ok(())
}

/// Read the provider's credential from its configured environment variable.
pub fn resolve_api_key<F>(provider: &ProviderSeed, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    match provider.api_key_env.as_deref() {
        Some(var) => match lookup(var) {
            Some(key) if !key.trim().is_empty() => key,
            _ => {
                tracing::warn!(
                    provider = %provider.name,
                    env = var,
                    "API key variable not set, keeping any stored key"
                );
                String::new()
            }
        },
        None => String::new(),
    }
}

pub async fn seed_catalog<F>(
    repo: &ProviderRepository,
    catalog: &CatalogSeed,
    lookup: F,
) -> Result<SeedSummary>
where
    F: Fn(&str) -> Option<String>,
{
    let mut summary = SeedSummary::default();

    for seed in &catalog.providers {
        let api_key = resolve_api_key(seed, &lookup);
        let provider = repo
            .upsert_provider(&seed.name, &seed.base_url, &api_key, seed.is_active)
            .await?;
        summary.providers += 1;

        for model in &seed.models {
            repo.upsert_model(provider.id, model).await?;
            summary.models += 1;
        }
    }

    tracing::info!(
        providers = summary.providers,
        models = summary.models,
        "Catalog seeded"
    );
    Ok(summary)
}
