use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::info;

use super::client::ClientError;
use super::client::DuerosClient;
use super::coordinator::Coordinator;
use super::entity::ApplianceEntity;
use super::entity::Tracked;
use super::error::DuerosError;
use super::model::Appliance;
use super::model::ApplianceType;
use super::model::DeviceActionResponse;
use super::model::TurnOnState;
use crate::engine::CoverCommand;
use crate::engine::CoverDeviceClass;
use crate::engine::CoverFeature;
use crate::engine::CoverState;
use crate::engine::Entity;
use crate::engine::FromIntegrationMessage;
use crate::engine::Platform;

/// Cover platform setup: one entity per appliance tagged CURTAIN
pub fn setup_entities<C: DuerosClient>(coordinator: &Arc<Coordinator<C>>) -> Vec<DuerosCover<C>> {
    coordinator
        .snapshot()
        .values()
        .filter(|appliance| appliance.has_type(ApplianceType::Curtain))
        .map(|appliance| DuerosCover::new(coordinator.clone(), appliance.clone()))
        .collect()
}

/// Curtain backed by a DuerOS appliance.
///
/// DuerOS reports curtains as on (open) or off (closed) plus an opening degree.
pub struct DuerosCover<C: DuerosClient> {
    base: ApplianceEntity<C>,
    is_closed: Tracked<Option<bool>>,
    current_position: Tracked<Option<u8>>,
}

impl<C: DuerosClient> DuerosCover<C> {
    pub fn new(coordinator: Arc<Coordinator<C>>, appliance: Appliance) -> Self {
        let mut cover = Self {
            base: ApplianceEntity::new(coordinator, appliance.clone(), Platform::Cover),
            is_closed: Tracked::default(),
            current_position: Tracked::default(),
        };
        cover.update(appliance);
        cover
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
        let settings = &self.base.appliance().state_settings;

        if settings.turn_on_state.value == Some(TurnOnState::Off) {
            self.is_closed.confirm(Some(true));
            self.current_position.settle();
        } else {
            self.is_closed.confirm(Some(false));
            let position = settings
                .degree
                .value
                .map(|degree| degree.value)
                .or(*self.current_position.confirmed());
            self.current_position.confirm(position);
        }
    }

    pub fn is_closed(&self) -> Option<bool> {
        *self.is_closed.get()
    }

    pub fn current_position(&self) -> Option<u8> {
        *self.current_position.get()
    }

    pub fn state(&self) -> CoverState {
        CoverState {
            available: self.base.available(),
            device_class: CoverDeviceClass::Curtain,
            closed: self.is_closed(),
            position: self.current_position(),
            supported_features: BTreeSet::from([
                CoverFeature::Open,
                CoverFeature::Close,
                CoverFeature::SetPosition,
                CoverFeature::Stop,
            ]),
        }
    }

    pub async fn open(&mut self) -> Result<(), DuerosError> {
        info!(entity_id = %self.base.entity_id(), "Opening cover");

        self.is_closed.set_pending(Some(false));
        let result = self.base.client().turn_on(self.base.appliance_id()).await;
        self.finish(result)
    }

    pub async fn close(&mut self) -> Result<(), DuerosError> {
        info!(entity_id = %self.base.entity_id(), "Closing cover");

        self.is_closed.set_pending(Some(true));
        let result = self.base.client().turn_off(self.base.appliance_id()).await;
        self.finish(result)
    }

    pub async fn stop(&mut self) -> Result<(), DuerosError> {
        info!(entity_id = %self.base.entity_id(), "Stopping cover");

        let result = self.base.client().pause(self.base.appliance_id()).await;
        self.finish(result)
    }

    /// Move to `position` percent, or re-send the current position when omitted
    pub async fn set_position(&mut self, position: Option<u8>) -> Result<(), DuerosError> {
        let Some(percent) = position.or(self.current_position()) else {
            return Err(DuerosError::CommandFailed(format!(
                "No position given and the position of {} is unknown",
                self.base.name()
            )));
        };
        let percent = percent.min(100);
        info!(entity_id = %self.base.entity_id(), percent, "Setting cover position");

        self.current_position.set_pending(Some(percent));
        let result = self
            .base
            .client()
            .turn_on_percent(self.base.appliance_id(), percent)
            .await;
        self.finish(result)
    }

    fn finish(&self, result: Result<DeviceActionResponse, ClientError>) -> Result<(), DuerosError> {
        self.base.check_command(result)?;
        self.base.request_refresh();
        Ok(())
    }

    pub async fn handle_command(&mut self, command: CoverCommand) -> Result<(), DuerosError> {
        match command {
            CoverCommand::Open => self.open().await,
            CoverCommand::Close => self.close().await,
            CoverCommand::Stop => self.stop().await,
            CoverCommand::SetPosition { position } => self.set_position(position).await,
        }
    }
}

impl<C: DuerosClient> Entity for DuerosCover<C> {
    fn entity_id(&self) -> &str {
        self.base.entity_id()
    }

    fn platform(&self) -> Platform {
        Platform::Cover
    }

    fn state_message(&self) -> FromIntegrationMessage {
        FromIntegrationMessage::CoverStateChanged {
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

    fn cover(appliance: Appliance) -> DuerosCover<MockDuerosClient> {
        let coordinator = Arc::new(Coordinator::new(
            MockDuerosClient::new(vec![appliance.clone()]),
            Duration::from_secs(300),
        ));
        DuerosCover::new(coordinator, appliance)
    }

    fn client(cover: &DuerosCover<MockDuerosClient>) -> &MockDuerosClient {
        cover.base().client()
    }

    #[test]
    fn test_open_with_degree() {
        let cover = cover(testing::curtain("bot-a", "curtain").on(true).degree(40).build());

        assert_eq!(cover.is_closed(), Some(false));
        assert_eq!(cover.current_position(), Some(40));
    }

    #[test]
    fn test_off_means_closed() {
        let mut cover = cover(testing::curtain("bot-a", "curtain").on(true).degree(40).build());

        cover.update(testing::curtain("bot-a", "curtain").on(false).degree(0).build());
        assert_eq!(cover.is_closed(), Some(true));
        // Position is only derived while open
        assert_eq!(cover.current_position(), Some(40));
    }

    #[test]
    fn test_unreachable_keeps_attributes() {
        let mut cover = cover(testing::curtain("bot-a", "curtain").on(true).degree(60).build());

        cover.update(
            testing::curtain("bot-a", "curtain")
                .unreachable()
                .on(false)
                .build(),
        );

        let state = cover.state();
        assert!(!state.available);
        assert_eq!(state.device_class, CoverDeviceClass::Curtain);
        assert_eq!(state.closed, Some(false));
        assert_eq!(state.position, Some(60));
    }

    #[test]
    fn test_supports_every_cover_command() {
        let cover = cover(testing::curtain("bot-a", "curtain").on(false).build());

        let features: Vec<_> = cover.state().supported_features.into_iter().collect();
        assert_eq!(
            features,
            vec![
                CoverFeature::Open,
                CoverFeature::Close,
                CoverFeature::SetPosition,
                CoverFeature::Stop,
            ]
        );
    }

    #[tokio::test]
    async fn test_set_position_sends_percent_and_refreshes_once() {
        let mut cover = cover(testing::curtain("bot-a", "curtain").on(true).degree(40).build());

        cover.set_position(Some(75)).await.unwrap();

        assert_eq!(
            client(&cover).action_calls(),
            vec![MockCall::TurnOnPercent("curtain".to_string(), 75)]
        );
        assert_eq!(cover.current_position(), Some(75));

        let coordinator = cover.base().coordinator();
        assert!(coordinator.refresh_if_requested().await.is_some());
        assert!(coordinator.refresh_if_requested().await.is_none());
        assert_eq!(client(&cover).device_list_calls(), 1);
    }

    #[tokio::test]
    async fn test_set_position_defaults_to_current() {
        let mut cover = cover(testing::curtain("bot-a", "curtain").on(true).degree(30).build());

        cover
            .handle_command(CoverCommand::SetPosition { position: None })
            .await
            .unwrap();

        assert_eq!(
            client(&cover).action_calls(),
            vec![MockCall::TurnOnPercent("curtain".to_string(), 30)]
        );
    }

    #[tokio::test]
    async fn test_set_position_without_known_position_fails() {
        let mut cover = cover(testing::curtain("bot-a", "curtain").on(false).build());

        let err = cover.set_position(None).await.unwrap_err();
        assert!(matches!(err, DuerosError::CommandFailed(_)));
        assert!(client(&cover).action_calls().is_empty());
    }

    #[tokio::test]
    async fn test_open_close_stop_map_to_on_off_pause() {
        let mut cover = cover(testing::curtain("bot-a", "curtain").on(false).build());

        cover.handle_command(CoverCommand::Open).await.unwrap();
        assert_eq!(cover.is_closed(), Some(false));
        cover.handle_command(CoverCommand::Stop).await.unwrap();
        cover.handle_command(CoverCommand::Close).await.unwrap();
        assert_eq!(cover.is_closed(), Some(true));

        assert_eq!(
            client(&cover).action_calls(),
            vec![
                MockCall::TurnOn("curtain".to_string()),
                MockCall::Pause("curtain".to_string()),
                MockCall::TurnOff("curtain".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_command_keeps_optimistic_state() {
        let mut cover = cover(testing::curtain("bot-a", "curtain").on(false).build());
        client(&cover).set_action_status(Status::Other(3), "motor jammed");

        let err = cover.open().await.unwrap_err();

        assert_eq!(err, DuerosError::CommandFailed("motor jammed".to_string()));
        assert_eq!(cover.is_closed(), Some(false));
        assert!(!cover.base().coordinator().refresh_requested());
    }
}
