/// Entity abstraction for duerosd
///
/// All entities (lights, covers) implement the Entity trait.
use serde::Serialize;

use super::message::FromIntegrationMessage;

/// Entity platform, used as the prefix of entity ids (e.g. "light.kitchen").
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Platform {
    Light,
    Cover,
}

/// Base trait that all entities must implement
pub trait Entity: Send + Sync {
    /// Engine-facing entity id (e.g. "light.dueros_bot_1")
    fn entity_id(&self) -> &str;

    /// Return the platform type of this entity
    fn platform(&self) -> Platform;

    /// Build the message reporting this entity's current local state to the engine
    fn state_message(&self) -> FromIntegrationMessage;
}
