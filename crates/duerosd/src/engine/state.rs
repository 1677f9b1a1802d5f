use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

use super::device::Device;
use super::entity::Platform;

/// How a light's color is controlled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorMode {
    Brightness,
    ColorTemp,
}

/// State of a light entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LightState {
    /// Whether the remote appliance is reachable. Other fields are last-known values when false.
    pub available: bool,

    /// Whether the light is on or off.
    pub on: bool,

    /// Brightness level (0-255), if supported.
    pub brightness: Option<u8>,

    /// Color temperature in Kelvin, if supported.
    pub color_temp_kelvin: Option<u32>,

    pub min_color_temp_kelvin: Option<u32>,
    pub max_color_temp_kelvin: Option<u32>,

    /// Mode the light is currently in.
    pub color_mode: Option<ColorMode>,
    pub supported_color_modes: BTreeSet<ColorMode>,

    /// Icon supplied by the remote platform.
    pub entity_picture: Option<String>,
}

/// Kind of physical cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverDeviceClass {
    #[default]
    Curtain,
}

/// Command a cover accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverFeature {
    Open,
    Close,
    SetPosition,
    Stop,
}

/// State of a cover entity (curtains).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CoverState {
    pub available: bool,

    pub device_class: CoverDeviceClass,

    /// `None` until the first reachable update arrives.
    pub closed: Option<bool>,

    /// Position in percent (0 = closed, 100 = fully open).
    pub position: Option<u8>,

    pub supported_features: BTreeSet<CoverFeature>,
}

/// Registry entry describing an entity known to the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityInfo {
    pub unique_id: String,
    pub name: String,
    pub platform: Platform,
    pub integration: String,
    pub device: Device,
}

/// Centralized snapshot of the entire engine state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct State {
    pub entities: BTreeMap<String, EntityInfo>,
    pub lights: HashMap<String, LightState>,
    pub covers: HashMap<String, CoverState>,
}
