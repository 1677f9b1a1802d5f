//! Appliance fixtures shared by the DuerOS tests

use super::model::Appliance;
use super::model::ApplianceType;
use super::model::Brightness;
use super::model::ColorTemperatureInKelvin;
use super::model::Connectivity;
use super::model::Degree;
use super::model::StateSetting;
use super::model::TurnOnState;

pub(crate) struct ApplianceBuilder(Appliance);

fn appliance(bot_id: &str, appliance_id: &str, appliance_type: ApplianceType) -> ApplianceBuilder {
    let mut appliance = Appliance {
        appliance_id: appliance_id.to_string(),
        bot_id: bot_id.to_string(),
        friendly_name: appliance_id.to_string(),
        bot_name: "Acme".to_string(),
        appliance_types: [appliance_type].into_iter().collect(),
        icon_urls: Vec::new(),
        state_settings: Default::default(),
    };
    appliance.state_settings.connectivity = StateSetting::new(Connectivity::Reachable);
    ApplianceBuilder(appliance)
}

pub(crate) fn light(bot_id: &str, appliance_id: &str) -> ApplianceBuilder {
    appliance(bot_id, appliance_id, ApplianceType::Light)
}

pub(crate) fn curtain(bot_id: &str, appliance_id: &str) -> ApplianceBuilder {
    appliance(bot_id, appliance_id, ApplianceType::Curtain)
}

impl ApplianceBuilder {
    pub(crate) fn name(mut self, name: &str) -> Self {
        self.0.friendly_name = name.to_string();
        self
    }

    pub(crate) fn unreachable(mut self) -> Self {
        self.0.state_settings.connectivity = StateSetting::new(Connectivity::Unreachable);
        self
    }

    pub(crate) fn on(mut self, on: bool) -> Self {
        let state = if on { TurnOnState::On } else { TurnOnState::Off };
        self.0.state_settings.turn_on_state = StateSetting::new(state);
        self
    }

    pub(crate) fn brightness(mut self, percentage: u8) -> Self {
        self.0.state_settings.brightness = StateSetting::new(Brightness(percentage));
        self
    }

    pub(crate) fn color_temperature(mut self, in_kelvin: u32, min: u32, max: u32) -> Self {
        self.0.state_settings.color_temperature_in_kelvin =
            StateSetting::new(ColorTemperatureInKelvin {
                in_kelvin: Some(in_kelvin),
                kelvin_min: min,
                kelvin_max: max,
            });
        self
    }

    pub(crate) fn degree(mut self, value: u8) -> Self {
        self.0.state_settings.degree = StateSetting::new(Degree { value });
        self
    }

    pub(crate) fn icon(mut self, url: &str) -> Self {
        self.0.icon_urls.push(url.to_string());
        self
    }

    pub(crate) fn build(self) -> Appliance {
        self.0
    }
}
