//! Type-safe message system for duerosd
//!
//! Messages are split by direction to enforce correct usage at compile time:
//! - `FromIntegrationMessage`: Events from integrations to the engine
//! - `ToIntegrationMessage`: Commands from the engine to integrations

use serde::Deserialize;
use serde::Serialize;

use super::device::Device;
use super::entity::Platform;
use super::state::CoverState;
use super::state::LightState;

/// Messages FROM integrations TO the engine (events/state updates)
#[derive(Debug, Clone)]
pub enum FromIntegrationMessage {
    /// An entity was discovered and registered
    EntityDiscovered {
        entity_id: String,
        unique_id: String,
        name: String,
        platform: Platform,
        device: Device,
        integration_name: String,
    },

    /// A light's state changed
    LightStateChanged { entity_id: String, state: LightState },

    /// A cover's state changed
    CoverStateChanged { entity_id: String, state: CoverState },
}

/// Light command payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LightCommand {
    TurnOn {
        /// Brightness on the 0-255 scale
        #[serde(default)]
        brightness: Option<u8>,
        #[serde(default)]
        color_temp_kelvin: Option<u32>,
    },
    TurnOff,
}

/// Cover command payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CoverCommand {
    Open,
    Close,
    Stop,
    SetPosition {
        /// Defaults to the current position when omitted
        #[serde(default)]
        position: Option<u8>,
    },
}

/// Messages FROM the engine TO integrations (commands)
#[derive(Debug, Clone, PartialEq)]
pub enum ToIntegrationMessage {
    Light {
        entity_id: String,
        command: LightCommand,
    },
    Cover {
        entity_id: String,
        command: CoverCommand,
    },
}

impl ToIntegrationMessage {
    /// Entity the command is addressed to, used for routing
    pub fn entity_id(&self) -> &str {
        match self {
            ToIntegrationMessage::Light { entity_id, .. } => entity_id,
            ToIntegrationMessage::Cover { entity_id, .. } => entity_id,
        }
    }

    /// Platform the command is meant for
    pub fn platform(&self) -> Platform {
        match self {
            ToIntegrationMessage::Light { .. } => Platform::Light,
            ToIntegrationMessage::Cover { .. } => Platform::Cover,
        }
    }
}
