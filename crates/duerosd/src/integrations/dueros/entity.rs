//! Appliance-bound entities.
//!
//! `ApplianceEntity` binds one appliance of the coordinator snapshot to a local entity and
//! holds what every platform shares: identity, availability, device metadata and the
//! command/response policy. Platform entities (`DuerosLight`, `DuerosCover`) embed it and
//! `DuerosEntity` is the per-platform variant the integration stores.

use std::sync::Arc;

use tracing::error;
use tracing::warn;

use super::client::ClientError;
use super::client::DuerosClient;
use super::coordinator::Coordinator;
use super::coordinator::Snapshot;
use super::cover::DuerosCover;
use super::error::check_response;
use super::error::DuerosError;
use super::light::DuerosLight;
use super::model::Appliance;
use super::model::DeviceActionResponse;
use crate::engine::Device;
use crate::engine::Entity;
use crate::engine::FromIntegrationMessage;
use crate::engine::Platform;

pub const DOMAIN: &str = "dueros";
pub const NAME: &str = "DuerOS";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// A locally cached attribute with an optional optimistic value.
///
/// Commands set a pending value for responsive feedback; the next authoritative
/// recomputation confirms a value and drops whatever was pending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tracked<T> {
    confirmed: T,
    pending: Option<T>,
}

impl<T> Tracked<T> {
    #[cfg(test)]
    pub fn new(confirmed: T) -> Self {
        Self {
            confirmed,
            pending: None,
        }
    }

    /// Value to display: the pending value if there is one, else the confirmed one
    pub fn get(&self) -> &T {
        self.pending.as_ref().unwrap_or(&self.confirmed)
    }

    pub fn confirmed(&self) -> &T {
        &self.confirmed
    }

    #[cfg(test)]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn set_pending(&mut self, value: T) {
        self.pending = Some(value);
    }

    pub fn confirm(&mut self, value: T) {
        self.confirmed = value;
        self.pending = None;
    }

    /// Keep the confirmed value but drop the pending one
    pub fn settle(&mut self) {
        self.pending = None;
    }
}

/// Entity id for an appliance, stable across polls and renames
pub fn entity_id(platform: Platform, unique_id: &str) -> String {
    let slug: String = unique_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{}.{}_{}", platform, DOMAIN, slug)
}

/// State and behaviour shared by every appliance-bound entity
pub struct ApplianceEntity<C: DuerosClient> {
    coordinator: Arc<Coordinator<C>>,
    appliance: Appliance,
    platform: Platform,
    unique_id: String,
    entity_id: String,
    name: String,
    available: bool,
    device: Device,
}

impl<C: DuerosClient> ApplianceEntity<C> {
    pub fn new(coordinator: Arc<Coordinator<C>>, appliance: Appliance, platform: Platform) -> Self {
        let unique_id = appliance.unique_id();
        let device = Device::new(NAME)
            .with_identifier(DOMAIN, unique_id.clone())
            .with_model(VERSION)
            .with_manufacturer(appliance.bot_name.clone());

        let mut entity = Self {
            coordinator,
            entity_id: entity_id(platform, &unique_id),
            name: appliance.friendly_name.clone(),
            platform,
            unique_id,
            available: false,
            device,
            appliance: appliance.clone(),
        };
        entity.update(appliance);
        entity
    }

    /// Take a new appliance record. Returns whether the appliance is available; when it is
    /// not, nothing besides availability is recomputed.
    pub fn update(&mut self, appliance: Appliance) -> bool {
        self.available = appliance.state_settings.is_reachable();
        if self.available {
            self.name = appliance.friendly_name.clone();
        }
        self.appliance = appliance;
        self.available
    }

    /// The appliance record for this entity in `snapshot`
    pub fn lookup<'a>(&self, snapshot: &'a Snapshot) -> Option<&'a Appliance> {
        snapshot.get(&self.unique_id)
    }

    /// The appliance disappeared from the account. The entity stays registered but
    /// unavailable until the appliance comes back.
    pub fn mark_missing(&mut self) {
        if self.available {
            warn!(
                entity_id = %self.entity_id,
                "Appliance {} is no longer reported by DuerOS; marking unavailable",
                self.unique_id
            );
        }
        self.available = false;
    }

    #[cfg(test)]
    pub fn coordinator(&self) -> &Arc<Coordinator<C>> {
        &self.coordinator
    }

    pub fn client(&self) -> &C {
        self.coordinator.client()
    }

    pub fn appliance(&self) -> &Appliance {
        &self.appliance
    }

    pub fn appliance_id(&self) -> &str {
        &self.appliance.appliance_id
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    #[cfg(test)]
    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn available(&self) -> bool {
        self.available
    }

    #[cfg(test)]
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Interpret the outcome of one remote command
    pub fn check_command(
        &self,
        result: Result<DeviceActionResponse, ClientError>,
    ) -> Result<(), DuerosError> {
        let rsp = result.map_err(|e| {
            error!(entity_id = %self.entity_id, "Command could not be sent: {}", e);
            DuerosError::CommandFailed(e.to_string())
        })?;
        check_response(&rsp)
    }

    /// Ask the coordinator to re-poll after a command
    pub fn request_refresh(&self) {
        self.coordinator.request_refresh();
    }

    pub fn discovery_message(&self, integration_name: &str) -> FromIntegrationMessage {
        FromIntegrationMessage::EntityDiscovered {
            entity_id: self.entity_id.clone(),
            unique_id: self.unique_id.clone(),
            name: self.name.clone(),
            platform: self.platform,
            device: self.device.clone(),
            integration_name: integration_name.to_string(),
        }
    }
}

/// An entity of any supported platform
pub enum DuerosEntity<C: DuerosClient> {
    Light(DuerosLight<C>),
    Cover(DuerosCover<C>),
}

impl<C: DuerosClient> DuerosEntity<C> {
    pub fn base(&self) -> &ApplianceEntity<C> {
        match self {
            DuerosEntity::Light(light) => light.base(),
            DuerosEntity::Cover(cover) => cover.base(),
        }
    }

    fn base_mut(&mut self) -> &mut ApplianceEntity<C> {
        match self {
            DuerosEntity::Light(light) => light.base_mut(),
            DuerosEntity::Cover(cover) => cover.base_mut(),
        }
    }

    /// Re-render from a newly published snapshot. Returns false if the appliance is missing.
    pub fn handle_coordinator_update(&mut self, snapshot: &Snapshot) -> bool {
        let Some(appliance) = self.base().lookup(snapshot).cloned() else {
            self.base_mut().mark_missing();
            return false;
        };
        match self {
            DuerosEntity::Light(light) => light.update(appliance),
            DuerosEntity::Cover(cover) => cover.update(appliance),
        }
        true
    }
}

impl<C: DuerosClient> Entity for DuerosEntity<C> {
    fn entity_id(&self) -> &str {
        self.base().entity_id()
    }

    fn platform(&self) -> Platform {
        self.base().platform()
    }

    fn state_message(&self) -> FromIntegrationMessage {
        match self {
            DuerosEntity::Light(light) => light.state_message(),
            DuerosEntity::Cover(cover) => cover.state_message(),
        }
    }
}
