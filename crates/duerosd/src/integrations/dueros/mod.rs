mod client;
mod coordinator;
mod cover;
// Private module - allowed by clippy.toml allow-private-module-inception
#[allow(clippy::module_inception)]
mod dueros;
mod entity;
mod error;
mod light;
mod model;
#[cfg(test)]
mod testing;

use std::time::Duration;

use anyhow::Context;
pub use client::DuerosClient;
pub use client::HttpClient;
pub use coordinator::Coordinator;
pub use dueros::DuerosIntegration;
pub use error::DuerosError;
use linkme::distributed_slice;
use tracing::error;
use tracing::info;

use crate::config::Config;
use crate::engine;

#[distributed_slice(engine::INTEGRATION_REGISTRY)]
fn init_dueros(ctx: &engine::IntegrationContext) -> engine::IntegrationFactoryResult {
    let mut integrations: Vec<Box<dyn engine::Integration>> = Vec::new();

    for (entry_id, entry) in &ctx.config.integrations.dueros {
        if !entry.enabled {
            info!("DuerOS entry {} is disabled, skipping", entry_id);
            continue;
        }

        let client = HttpClient::new(entry)
            .with_context(|| format!("Failed to create DuerOS client for {}", entry_id))?;
        integrations.push(Box::new(DuerosIntegration::new(
            entry_id,
            client,
            Duration::from_secs(entry.update_interval_secs),
        )));
    }

    Ok(integrations)
}

/// Check credentials by fetching the appliance list once.
///
/// Any non-OK status is an error. Returns the number of appliances on the account.
pub async fn validate_entry<C: DuerosClient>(client: C) -> Result<usize, DuerosError> {
    let coordinator = Coordinator::new(client, coordinator::DEFAULT_UPDATE_INTERVAL);
    coordinator.refresh().await?;
    Ok(coordinator.snapshot().len())
}

/// Check the credentials of every enabled DuerOS entry in `config`
pub async fn validate_entries(config: &Config) -> anyhow::Result<()> {
    let mut failed = Vec::new();

    for (entry_id, entry) in &config.integrations.dueros {
        if !entry.enabled {
            continue;
        }

        let client = HttpClient::new(entry)
            .with_context(|| format!("Failed to create DuerOS client for {}", entry_id))?;
        match validate_entry(client).await {
            Ok(appliances) => info!(
                "DuerOS entry {} ({}): credentials valid, {} appliances",
                entry_id, entry.username, appliances
            ),
            Err(e) => {
                error!("DuerOS entry {} ({}): {}", entry_id, entry.username, e);
                failed.push(entry_id.as_str());
            }
        }
    }

    if !failed.is_empty() {
        anyhow::bail!("Invalid DuerOS entries: {}", failed.join(", "));
    }
    Ok(())
}
