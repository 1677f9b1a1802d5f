use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::info;

use super::client::DuerosClient;
use super::coordinator::Coordinator;
use super::entity::ApplianceEntity;
use super::entity::Tracked;
use super::error::DuerosError;
use super::model::Appliance;
use super::model::ApplianceType;
use super::model::Brightness;
use super::model::TurnOnState;
use crate::engine::ColorMode;
use crate::engine::Entity;
use crate::engine::FromIntegrationMessage;
use crate::engine::LightCommand;
use crate::engine::LightState;
use crate::engine::Platform;

/// Top of the local brightness scale
pub const BRIGHTNESS_MAX: u32 = 255;

/// Convert a DuerOS brightness percentage to the local 0-255 scale
pub fn brightness_dueros_to_ha(brightness: Brightness) -> u8 {
    let percentage = u32::from(brightness.percentage().min(100));
    (percentage * BRIGHTNESS_MAX / 100) as u8
}

/// Convert a local 0-255 brightness to a DuerOS percentage (1-100)
pub fn brightness_ha_to_dueros(brightness: u8) -> Brightness {
    let local = u32::from(brightness).saturating_sub(1);
    Brightness((1 + local * 100 / BRIGHTNESS_MAX) as u8)
}

/// 1-based index of `kelvin` between the appliance's bounds, as DuerOS expects it
pub fn color_temp_index(kelvin: u32, kelvin_min: u32, kelvin_max: u32) -> u32 {
    if kelvin_max <= kelvin_min {
        return 1;
    }
    let kelvin = kelvin.clamp(kelvin_min, kelvin_max);
    let ratio = f64::from(kelvin - kelvin_min) / f64::from(kelvin_max - kelvin_min);
    1 + ratio.round() as u32
}

/// Light platform setup: one entity per appliance tagged LIGHT
pub fn setup_entities<C: DuerosClient>(coordinator: &Arc<Coordinator<C>>) -> Vec<DuerosLight<C>> {
    coordinator
        .snapshot()
        .values()
        .filter(|appliance| appliance.has_type(ApplianceType::Light))
        .map(|appliance| DuerosLight::new(coordinator.clone(), appliance.clone()))
        .collect()
}

/// Light entity backed by a DuerOS appliance
pub struct DuerosLight<C: DuerosClient> {
    base: ApplianceEntity<C>,
    is_on: Tracked<bool>,
    /// Brightness level (0-255)
    brightness: Tracked<Option<u8>>,
    color_temp_kelvin: Tracked<Option<u32>>,
    min_color_temp_kelvin: Option<u32>,
    max_color_temp_kelvin: Option<u32>,
    entity_picture: Option<String>,
}

impl<C: DuerosClient> DuerosLight<C> {
    pub fn new(coordinator: Arc<Coordinator<C>>, appliance: Appliance) -> Self {
        let mut light = Self {
            base: ApplianceEntity::new(coordinator, appliance.clone(), Platform::Light),
            is_on: Tracked::default(),
            brightness: Tracked::default(),
            color_temp_kelvin: Tracked::default(),
            min_color_temp_kelvin: None,
            max_color_temp_kelvin: None,
            entity_picture: None,
        };
        light.update(appliance);
        light
    }

    pub fn base(&self) -> &ApplianceEntity<C> {
        &self.base
    }

    pub(super) fn base_mut(&mut self) -> &mut ApplianceEntity<C> {
        &mut self.base
    }

    /// Recompute local attributes from an appliance record
    pub fn update(&mut self, appliance: Appliance) {
        if !self.base.update(appliance) {
            return;
        }
        let appliance = self.base.appliance();
        let settings = &appliance.state_settings;

        self.entity_picture = appliance.icon_urls.first().cloned();

        let brightness = settings
            .brightness
            .value
            .map(brightness_dueros_to_ha)
            .or(*self.brightness.confirmed());
        self.brightness.confirm(brightness);

        let mut color_temp = *self.color_temp_kelvin.confirmed();
        if let Some(ct) = settings.color_temperature_in_kelvin.value {
            color_temp = ct.in_kelvin.or(color_temp);
            self.min_color_temp_kelvin = Some(ct.kelvin_min);
            self.max_color_temp_kelvin = Some(ct.kelvin_max);
        }
        self.color_temp_kelvin.confirm(color_temp);

        self.is_on
            .confirm(settings.turn_on_state.value == Some(TurnOnState::On));
    }

    pub fn is_on(&self) -> bool {
        *self.is_on.get()
    }

    pub fn brightness(&self) -> Option<u8> {
        *self.brightness.get()
    }

    pub fn color_temp_kelvin(&self) -> Option<u32> {
        *self.color_temp_kelvin.get()
    }

    pub fn min_color_temp_kelvin(&self) -> Option<u32> {
        self.min_color_temp_kelvin
    }

    pub fn max_color_temp_kelvin(&self) -> Option<u32> {
        self.max_color_temp_kelvin
    }

    pub fn entity_picture(&self) -> Option<&str> {
        self.entity_picture.as_deref()
    }

    pub fn state(&self) -> LightState {
        LightState {
            available: self.base.available(),
            on: self.is_on(),
            brightness: self.brightness(),
            color_temp_kelvin: self.color_temp_kelvin(),
            min_color_temp_kelvin: self.min_color_temp_kelvin(),
            max_color_temp_kelvin: self.max_color_temp_kelvin(),
            color_mode: Some(ColorMode::ColorTemp),
            supported_color_modes: BTreeSet::from([ColorMode::ColorTemp, ColorMode::Brightness]),
            entity_picture: self.entity_picture().map(str::to_string),
        }
    }

    async fn set_brightness(&self, brightness: u8) -> Result<(), DuerosError> {
        let percentage = brightness_ha_to_dueros(brightness).percentage();
        let result = self
            .base
            .client()
            .set_brightness_percentage(self.base.appliance_id(), percentage)
            .await;
        self.base.check_command(result)
    }

    async fn set_color_temp(&self, kelvin: u32) -> Result<(), DuerosError> {
        let (Some(min), Some(max)) = (self.min_color_temp_kelvin, self.max_color_temp_kelvin) else {
            return Err(DuerosError::CommandFailed(format!(
                "{} does not report a color temperature range",
                self.base.name()
            )));
        };
        let result = self
            .base
            .client()
            .set_color_temperature(self.base.appliance_id(), color_temp_index(kelvin, min, max))
            .await;
        self.base.check_command(result)
    }

    /// Turn the light on, applying brightness and color temperature first when given
    pub async fn turn_on(
        &mut self,
        brightness: Option<u8>,
        color_temp_kelvin: Option<u32>,
    ) -> Result<(), DuerosError> {
        info!(
            entity_id = %self.base.entity_id(),
            ?brightness,
            ?color_temp_kelvin,
            "Turning on light"
        );

        if let Some(brightness) = brightness {
            self.brightness.set_pending(Some(brightness));
            self.set_brightness(brightness).await?;
        }
        if let Some(kelvin) = color_temp_kelvin {
            self.color_temp_kelvin.set_pending(Some(kelvin));
            self.set_color_temp(kelvin).await?;
        }

        self.is_on.set_pending(true);
        let result = self.base.client().turn_on(self.base.appliance_id()).await;
        self.base.check_command(result)?;
        self.base.request_refresh();
        Ok(())
    }

    pub async fn turn_off(&mut self) -> Result<(), DuerosError> {
        info!(entity_id = %self.base.entity_id(), "Turning off light");

        self.is_on.set_pending(false);
        let result = self.base.client().turn_off(self.base.appliance_id()).await;
        self.base.check_command(result)?;
        self.base.request_refresh();
        Ok(())
    }

    pub async fn handle_command(&mut self, command: LightCommand) -> Result<(), DuerosError> {
        match command {
            LightCommand::TurnOn {
                brightness,
                color_temp_kelvin,
            } => self.turn_on(brightness, color_temp_kelvin).await,
            LightCommand::TurnOff => self.turn_off().await,
        }
    }
}

impl<C: DuerosClient> Entity for DuerosLight<C> {
    fn entity_id(&self) -> &str {
        self.base.entity_id()
    }

    fn platform(&self) -> Platform {
        Platform::Light
    }

    fn state_message(&self) -> FromIntegrationMessage {
        FromIntegrationMessage::LightStateChanged {
            entity_id: self.base.entity_id().to_string(),
            state: self.state(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::integrations::dueros::client::MockCall;
    use crate::integrations::dueros::client::MockDuerosClient;
    use crate::integrations::dueros::model::Status;
    use crate::integrations::dueros::testing;

    fn light(appliance: Appliance) -> DuerosLight<MockDuerosClient> {
        let coordinator = Arc::new(Coordinator::new(
            MockDuerosClient::new(vec![appliance.clone()]),
            Duration::from_secs(300),
        ));
        DuerosLight::new(coordinator, appliance)
    }

    fn client(light: &DuerosLight<MockDuerosClient>) -> &MockDuerosClient {
        light.base().client()
    }

    #[test]
    fn test_brightness_conversion() {
        assert_eq!(brightness_dueros_to_ha(Brightness(0)), 0);
        assert_eq!(brightness_dueros_to_ha(Brightness(50)), 127);
        assert_eq!(brightness_dueros_to_ha(Brightness(100)), 255);

        assert_eq!(brightness_ha_to_dueros(0), Brightness(1));
        assert_eq!(brightness_ha_to_dueros(1), Brightness(1));
        assert_eq!(brightness_ha_to_dueros(255), Brightness(100));
    }

    #[test]
    fn test_brightness_round_trip_within_one() {
        for p in 1..=100u8 {
            let back = brightness_ha_to_dueros(brightness_dueros_to_ha(Brightness(p)));
            let diff = (i16::from(back.percentage()) - i16::from(p)).abs();
            assert!(diff <= 1, "{p} came back as {}", back.percentage());
        }
    }

    #[test]
    fn test_color_temp_index() {
        assert_eq!(color_temp_index(2700, 2700, 6500), 1);
        assert_eq!(color_temp_index(4000, 2700, 6500), 1);
        assert_eq!(color_temp_index(5000, 2700, 6500), 2);
        assert_eq!(color_temp_index(6500, 2700, 6500), 2);
        assert_eq!(color_temp_index(9000, 2700, 6500), 2);
        assert_eq!(color_temp_index(3000, 3000, 3000), 1);
    }

    #[test]
    fn test_state_from_appliance() {
        let light = light(
            testing::light("bot-a", "lamp")
                .on(false)
                .brightness(50)
                .color_temperature(4000, 2700, 6500)
                .icon("https://example.com/lamp.png")
                .build(),
        );

        assert!(light.base().available());
        assert!(!light.is_on());
        assert_eq!(light.brightness(), Some(127));
        assert_eq!(light.color_temp_kelvin(), Some(4000));
        assert_eq!(light.min_color_temp_kelvin(), Some(2700));
        assert_eq!(light.max_color_temp_kelvin(), Some(6500));
        assert_eq!(light.entity_picture(), Some("https://example.com/lamp.png"));

        let state = light.state();
        assert_eq!(state.min_color_temp_kelvin, Some(2700));
        assert_eq!(state.entity_picture.as_deref(), Some("https://example.com/lamp.png"));
        assert_eq!(state.color_mode, Some(ColorMode::ColorTemp));
        assert_eq!(
            state.supported_color_modes,
            BTreeSet::from([ColorMode::Brightness, ColorMode::ColorTemp])
        );
    }

    #[test]
    fn test_unreachable_update_keeps_attributes() {
        let mut light = light(testing::light("bot-a", "lamp").on(true).brightness(80).build());
        assert_eq!(light.brightness(), Some(204));

        light.update(
            testing::light("bot-a", "lamp")
                .unreachable()
                .on(false)
                .brightness(10)
                .build(),
        );

        let state = light.state();
        assert!(!state.available);
        assert!(state.on);
        assert_eq!(state.brightness, Some(204));
    }

    #[tokio::test]
    async fn test_turn_on_sends_brightness_color_then_on() {
        let mut light = light(
            testing::light("bot-a", "lamp")
                .on(false)
                .color_temperature(2700, 2700, 6500)
                .build(),
        );

        light.turn_on(Some(255), Some(6500)).await.unwrap();

        assert_eq!(
            client(&light).action_calls(),
            vec![
                MockCall::SetBrightnessPercentage("lamp".to_string(), 100),
                MockCall::SetColorTemperature("lamp".to_string(), 2),
                MockCall::TurnOn("lamp".to_string()),
            ]
        );
        // Optimistic until the next poll
        assert!(light.is_on());
        assert_eq!(light.brightness(), Some(255));
        assert_eq!(light.color_temp_kelvin(), Some(6500));
        assert!(light.base().coordinator().refresh_requested());
    }

    #[tokio::test]
    async fn test_turn_on_without_arguments_only_turns_on() {
        let mut light = light(testing::light("bot-a", "lamp").on(false).brightness(20).build());

        light
            .handle_command(LightCommand::TurnOn {
                brightness: None,
                color_temp_kelvin: None,
            })
            .await
            .unwrap();

        assert_eq!(
            client(&light).action_calls(),
            vec![MockCall::TurnOn("lamp".to_string())]
        );
    }

    #[tokio::test]
    async fn test_poll_overrides_optimistic_state() {
        let mut light = light(testing::light("bot-a", "lamp").on(false).build());

        light.turn_on(None, None).await.unwrap();
        assert!(light.is_on());

        // The appliance did not actually turn on
        light.update(testing::light("bot-a", "lamp").on(false).build());
        assert!(!light.is_on());
    }

    #[tokio::test]
    async fn test_failed_sub_command_stops_turn_on() {
        let mut light = light(testing::light("bot-a", "lamp").on(false).build());
        client(&light).set_action_status(Status::Other(1), "device offline");

        let err = light.turn_on(Some(128), None).await.unwrap_err();

        assert_eq!(err, DuerosError::CommandFailed("device offline".to_string()));
        assert_eq!(
            client(&light).action_calls(),
            vec![MockCall::SetBrightnessPercentage("lamp".to_string(), 50)]
        );
        assert!(!light.base().coordinator().refresh_requested());
    }

    #[tokio::test]
    async fn test_color_temp_without_range_fails() {
        let mut light = light(testing::light("bot-a", "lamp").build());

        let err = light.turn_on(None, Some(4000)).await.unwrap_err();
        assert!(matches!(err, DuerosError::CommandFailed(_)));
        assert!(client(&light).action_calls().is_empty());
    }

    #[tokio::test]
    async fn test_turn_off_auth_failure() {
        let mut light = light(testing::light("bot-a", "lamp").on(true).build());
        client(&light).set_action_status(Status::NotLogin, "not logged in");

        let err = light.turn_off().await.unwrap_err();
        assert_eq!(err, DuerosError::AuthFailed("not logged in".to_string()));
        assert_eq!(
            client(&light).action_calls(),
            vec![MockCall::TurnOff("lamp".to_string())]
        );
    }
}
