use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use serde_json::Value;
use tracing::debug;

use super::model::Appliance;
use super::model::DeviceActionResponse;
use super::model::DeviceListResponse;
use super::model::Status;
use crate::config::DuerosEntryConfig;

const DEVICE_LIST_PATH: &str = "/saiya/smarthome/devicelist?from=h5_control";
const DIRECTIVE_PATH: &str = "/saiya/smarthome/directivesend?from=h5_control";
const CONTROL_NAMESPACE: &str = "DuerOS.ConnectedHome.Control";

/// Transport-level failure talking to the DuerOS API
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid session token: {0}")]
    InvalidToken(#[from] reqwest::header::InvalidHeaderValue),
}

/// Trait for DuerOS API operations
///
/// This trait allows for mocking the remote API for testing purposes
#[async_trait]
pub trait DuerosClient: Send + Sync {
    /// List every appliance bound to the account
    async fn get_device_list(&self) -> Result<DeviceListResponse, ClientError>;

    async fn turn_on(&self, appliance_id: &str) -> Result<DeviceActionResponse, ClientError>;

    async fn turn_off(&self, appliance_id: &str) -> Result<DeviceActionResponse, ClientError>;

    async fn pause(&self, appliance_id: &str) -> Result<DeviceActionResponse, ClientError>;

    /// Turn on to a percentage (curtain opening)
    async fn turn_on_percent(
        &self,
        appliance_id: &str,
        percent: u8,
    ) -> Result<DeviceActionResponse, ClientError>;

    async fn set_brightness_percentage(
        &self,
        appliance_id: &str,
        percent: u8,
    ) -> Result<DeviceActionResponse, ClientError>;

    /// Set color temperature by its 1-based index between the appliance's bounds
    async fn set_color_temperature(
        &self,
        appliance_id: &str,
        index: u32,
    ) -> Result<DeviceActionResponse, ClientError>;
}

/// Envelope shared by every DuerOS API response
#[derive(Debug, Deserialize)]
struct RawResponse<T> {
    status: Status,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

#[derive(Debug, Default, Deserialize)]
struct DeviceListData {
    #[serde(default)]
    appliances: Vec<Appliance>,
}

/// Build a DuerOS control directive for one appliance
fn directive(name: &str, appliance_id: &str, parameters: Value, message_id: &str) -> Value {
    let mut payload = json!({
        "appliance": {
            "applianceId": [appliance_id],
        },
    });
    if let (Some(fields), Value::Object(parameters)) = (payload.as_object_mut(), parameters) {
        fields.extend(parameters);
    }

    json!({
        "header": {
            "namespace": CONTROL_NAMESPACE,
            "name": name,
            "payloadVersion": "1",
            "messageId": message_id,
        },
        "payload": payload,
    })
}

fn message_id() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
        .to_string()
}

/// Real DuerOS client implementation using reqwest
pub struct HttpClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpClient {
    /// Create a new HttpClient from an entry configuration
    pub fn new(config: &DuerosEntryConfig) -> Result<Self, ClientError> {
        let mut cookie =
            reqwest::header::HeaderValue::from_str(&format!("BDUSS={}", config.bduss))?;
        cookie.set_sensitive(true);

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::COOKIE, cookie);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn send_directive(
        &self,
        name: &str,
        appliance_id: &str,
        parameters: Value,
    ) -> Result<DeviceActionResponse, ClientError> {
        let body = directive(name, appliance_id, parameters, &message_id());
        debug!(appliance_id, directive = name, "Sending DuerOS directive");

        let rsp: RawResponse<Value> = self
            .http
            .post(format!("{}{}", self.base_url, DIRECTIVE_PATH))
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(DeviceActionResponse {
            status: rsp.status,
            msg: rsp.msg,
        })
    }
}

#[async_trait]
impl DuerosClient for HttpClient {
    async fn get_device_list(&self) -> Result<DeviceListResponse, ClientError> {
        let rsp: RawResponse<DeviceListData> = self
            .http
            .get(format!("{}{}", self.base_url, DEVICE_LIST_PATH))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(DeviceListResponse {
            status: rsp.status,
            msg: rsp.msg,
            appliances: rsp.data.unwrap_or_default().appliances,
        })
    }

    async fn turn_on(&self, appliance_id: &str) -> Result<DeviceActionResponse, ClientError> {
        self.send_directive("TurnOnRequest", appliance_id, json!({}))
            .await
    }

    async fn turn_off(&self, appliance_id: &str) -> Result<DeviceActionResponse, ClientError> {
        self.send_directive("TurnOffRequest", appliance_id, json!({}))
            .await
    }

    async fn pause(&self, appliance_id: &str) -> Result<DeviceActionResponse, ClientError> {
        self.send_directive("PauseRequest", appliance_id, json!({}))
            .await
    }

    async fn turn_on_percent(
        &self,
        appliance_id: &str,
        percent: u8,
    ) -> Result<DeviceActionResponse, ClientError> {
        self.send_directive(
            "TurnOnPercentRequest",
            appliance_id,
            json!({ "degree": { "value": percent } }),
        )
        .await
    }

    async fn set_brightness_percentage(
        &self,
        appliance_id: &str,
        percent: u8,
    ) -> Result<DeviceActionResponse, ClientError> {
        self.send_directive(
            "SetBrightnessPercentageRequest",
            appliance_id,
            json!({ "brightness": { "value": percent } }),
        )
        .await
    }

    async fn set_color_temperature(
        &self,
        appliance_id: &str,
        index: u32,
    ) -> Result<DeviceActionResponse, ClientError> {
        self.send_directive(
            "SetColorTemperatureRequest",
            appliance_id,
            json!({ "colorTemperatureInKelvin": index }),
        )
        .await
    }
}

/// A call recorded by the mock client
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    GetDeviceList,
    TurnOn(String),
    TurnOff(String),
    Pause(String),
    TurnOnPercent(String, u8),
    SetBrightnessPercentage(String, u8),
    SetColorTemperature(String, u32),
}

/// Mock DuerOS client for testing
///
/// Returns the scripted device list / action response and records every call.
#[cfg(test)]
#[derive(Debug)]
pub struct MockDuerosClient {
    pub device_list: std::sync::Mutex<DeviceListResponse>,
    pub action_response: std::sync::Mutex<DeviceActionResponse>,
    pub calls: std::sync::Mutex<Vec<MockCall>>,
}

#[cfg(test)]
impl MockDuerosClient {
    /// Create a mock whose device list returns the given appliances with status OK
    pub fn new(appliances: Vec<Appliance>) -> Self {
        Self {
            device_list: std::sync::Mutex::new(DeviceListResponse {
                status: Status::Ok,
                msg: "ok".to_string(),
                appliances,
            }),
            action_response: std::sync::Mutex::new(DeviceActionResponse::ok()),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn set_appliances(&self, appliances: Vec<Appliance>) {
        let mut list = self.device_list.lock().unwrap();
        list.status = Status::Ok;
        list.appliances = appliances;
    }

    pub fn set_device_list_status(&self, status: Status, msg: &str) {
        let mut list = self.device_list.lock().unwrap();
        list.status = status;
        list.msg = msg.to_string();
    }

    pub fn set_action_status(&self, status: Status, msg: &str) {
        *self.action_response.lock().unwrap() = DeviceActionResponse {
            status,
            msg: msg.to_string(),
        };
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn device_list_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| **c == MockCall::GetDeviceList)
            .count()
    }

    /// Calls other than device-list fetches
    pub fn action_calls(&self) -> Vec<MockCall> {
        self.calls()
            .into_iter()
            .filter(|c| *c != MockCall::GetDeviceList)
            .collect()
    }

    fn record(&self, call: MockCall) -> Result<DeviceActionResponse, ClientError> {
        self.calls.lock().unwrap().push(call);
        Ok(self.action_response.lock().unwrap().clone())
    }
}

#[cfg(test)]
#[async_trait]
impl DuerosClient for MockDuerosClient {
    async fn get_device_list(&self) -> Result<DeviceListResponse, ClientError> {
        self.calls.lock().unwrap().push(MockCall::GetDeviceList);
        // Suspend like a real network call would, so concurrent callers can interleave
        tokio::task::yield_now().await;
        Ok(self.device_list.lock().unwrap().clone())
    }

    async fn turn_on(&self, appliance_id: &str) -> Result<DeviceActionResponse, ClientError> {
        self.record(MockCall::TurnOn(appliance_id.to_string()))
    }

    async fn turn_off(&self, appliance_id: &str) -> Result<DeviceActionResponse, ClientError> {
        self.record(MockCall::TurnOff(appliance_id.to_string()))
    }

    async fn pause(&self, appliance_id: &str) -> Result<DeviceActionResponse, ClientError> {
        self.record(MockCall::Pause(appliance_id.to_string()))
    }

    async fn turn_on_percent(
        &self,
        appliance_id: &str,
        percent: u8,
    ) -> Result<DeviceActionResponse, ClientError> {
        self.record(MockCall::TurnOnPercent(appliance_id.to_string(), percent))
    }

    async fn set_brightness_percentage(
        &self,
        appliance_id: &str,
        percent: u8,
    ) -> Result<DeviceActionResponse, ClientError> {
        self.record(MockCall::SetBrightnessPercentage(
            appliance_id.to_string(),
            percent,
        ))
    }

    async fn set_color_temperature(
        &self,
        appliance_id: &str,
        index: u32,
    ) -> Result<DeviceActionResponse, ClientError> {
        self.record(MockCall::SetColorTemperature(appliance_id.to_string(), index))
    }
}
