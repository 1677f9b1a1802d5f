//! Data model of the DuerOS smart-home API.
//!
//! Every state value is wrapped in a `{"value": ...}` object and may be absent, depending on
//! what the appliance supports.

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;

/// Separator between bot id and appliance id in a unique id
pub const BOT_ID_APPLIANCE_ID_SEPARATOR: &str = "/";

/// Treat an explicit `null` like a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Response status of the remote API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "i64")]
pub enum Status {
    Ok,
    NotLogin,
    Other(i64),
}

impl Status {
    pub const OK: i64 = 0;
    pub const NOT_LOGIN: i64 = 2;
}

impl From<i64> for Status {
    fn from(code: i64) -> Self {
        match code {
            Status::OK => Status::Ok,
            Status::NOT_LOGIN => Status::NotLogin,
            other => Status::Other(other),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, strum::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplianceType {
    Light,
    Curtain,
    Switch,
    Socket,
    AirCondition,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Connectivity {
    Reachable,
    Unreachable,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TurnOnState {
    On,
    Off,
    #[serde(other)]
    Unknown,
}

/// Brightness in percent (0-100)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Brightness(pub u8);

impl Brightness {
    pub fn percentage(self) -> u8 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorTemperatureInKelvin {
    pub in_kelvin: Option<u32>,
    pub kelvin_min: u32,
    pub kelvin_max: u32,
}

/// Curtain opening in percent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Degree {
    pub value: u8,
}

/// Optional state value as reported by the API
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StateSetting<T> {
    pub value: Option<T>,
}

impl<T> Default for StateSetting<T> {
    fn default() -> Self {
        Self { value: None }
    }
}

impl<T> StateSetting<T> {
    pub fn new(value: T) -> Self {
        Self { value: Some(value) }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StateSettings {
    #[serde(deserialize_with = "null_as_default")]
    pub connectivity: StateSetting<Connectivity>,
    #[serde(deserialize_with = "null_as_default")]
    pub turn_on_state: StateSetting<TurnOnState>,
    #[serde(deserialize_with = "null_as_default")]
    pub brightness: StateSetting<Brightness>,
    #[serde(deserialize_with = "null_as_default")]
    pub color_temperature_in_kelvin: StateSetting<ColorTemperatureInKelvin>,
    #[serde(deserialize_with = "null_as_default")]
    pub degree: StateSetting<Degree>,
}

impl StateSettings {
    pub fn is_reachable(&self) -> bool {
        self.connectivity.value == Some(Connectivity::Reachable)
    }
}

/// A remote-controlled device record
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Appliance {
    pub appliance_id: String,
    pub bot_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub friendly_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub bot_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub appliance_types: BTreeSet<ApplianceType>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub icon_urls: Vec<String>,
    #[serde(default, rename = "stateSetting", deserialize_with = "null_as_default")]
    pub state_settings: StateSettings,
}

impl Appliance {
    /// Key identifying this appliance across polls
    pub fn unique_id(&self) -> String {
        format!(
            "{}{}{}",
            self.bot_id, BOT_ID_APPLIANCE_ID_SEPARATOR, self.appliance_id
        )
    }

    pub fn has_type(&self, appliance_type: ApplianceType) -> bool {
        self.appliance_types.contains(&appliance_type)
    }
}

/// Result of the device-list operation
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceListResponse {
    pub status: Status,
    pub msg: String,
    pub appliances: Vec<Appliance>,
}

/// Result of any appliance action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceActionResponse {
    pub status: Status,
    pub msg: String,
}

impl DeviceActionResponse {
    pub fn ok() -> Self {
        Self {
            status: Status::Ok,
            msg: "ok".to_string(),
        }
    }
}
