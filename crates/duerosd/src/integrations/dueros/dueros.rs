use std::collections::BTreeMap;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::client::DuerosClient;
use super::coordinator::Coordinator;
use super::coordinator::Snapshot;
use super::cover;
use super::entity::DuerosEntity;
use super::light;
use crate::engine::Entity;
use crate::engine::FromIntegrationMessage;
use crate::engine::FromIntegrationSender;
use crate::engine::Integration;
use crate::engine::ToIntegrationMessage;

/// Type alias for the shared entity map, keyed by entity id
type EntitiesMap<C> = Arc<Mutex<BTreeMap<String, DuerosEntity<C>>>>;

/// DuerOS integration for one configured account
///
/// Owns the account's coordinator and every entity created from its appliances. Entities are
/// created once during setup; later snapshots only re-render them.
pub struct DuerosIntegration<C: DuerosClient + 'static> {
    name: String,
    coordinator: Arc<Coordinator<C>>,
    entities: EntitiesMap<C>,
    to_engine: Option<FromIntegrationSender>,
    /// Polling loop and snapshot listener
    tasks: Vec<JoinHandle<()>>,
}

impl<C: DuerosClient + 'static> DuerosIntegration<C> {
    pub fn new(entry_id: &str, client: C, update_interval: Duration) -> Self {
        Self {
            name: format!("dueros.{}", entry_id),
            coordinator: Arc::new(Coordinator::new(client, update_interval)),
            entities: Arc::new(Mutex::new(BTreeMap::new())),
            to_engine: None,
            tasks: Vec::new(),
        }
    }

    /// Re-render every entity whenever the coordinator publishes a snapshot
    async fn sync_entities_task(
        mut snapshots: watch::Receiver<Arc<Snapshot>>,
        entities: EntitiesMap<C>,
        to_engine: FromIntegrationSender,
    ) {
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            debug!(appliances = snapshot.len(), "Applying new snapshot");

            let mut entities = entities.lock().await;
            for entity in entities.values_mut() {
                entity.handle_coordinator_update(&snapshot);
                if to_engine.send(entity.state_message()).await.is_err() {
                    debug!("Engine channel closed, stopping entity sync");
                    return;
                }
            }
        }
    }

    async fn send(&self, msg: FromIntegrationMessage) {
        if let Some(tx) = &self.to_engine {
            if let Err(e) = tx.send(msg).await {
                warn!("Failed to send message to engine: {}", e);
            }
        }
    }
}

fn not_found(msg: String) -> Box<dyn Error + Send> {
    Box::new(std::io::Error::new(std::io::ErrorKind::NotFound, msg))
}

#[async_trait]
impl<C: DuerosClient + 'static> Integration for DuerosIntegration<C> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn setup(&mut self, tx: FromIntegrationSender) -> Result<(), Box<dyn Error + Send>> {
        info!("Setting up {}", self.name);

        // Nothing is registered unless the first poll succeeds
        self.coordinator
            .refresh()
            .await
            .map_err(|e| -> Box<dyn Error + Send> { Box::new(e) })?;

        {
            let mut entities = self.entities.lock().await;
            for light in light::setup_entities(&self.coordinator) {
                entities.insert(light.entity_id().to_string(), DuerosEntity::Light(light));
            }
            for cover in cover::setup_entities(&self.coordinator) {
                entities.insert(cover.entity_id().to_string(), DuerosEntity::Cover(cover));
            }

            for entity in entities.values() {
                info!(
                    "Discovered {} entity: {} ({})",
                    entity.platform(),
                    entity.base().name(),
                    entity.entity_id()
                );
                let discovered = entity.base().discovery_message(&self.name);
                for msg in [discovered, entity.state_message()] {
                    tx.send(msg)
                        .await
                        .map_err(|e| -> Box<dyn Error + Send> { Box::new(e) })?;
                }
            }
        }

        self.tasks.push(tokio::spawn(self.coordinator.clone().run()));
        self.tasks.push(tokio::spawn(Self::sync_entities_task(
            self.coordinator.subscribe(),
            self.entities.clone(),
            tx.clone(),
        )));
        self.to_engine = Some(tx);

        Ok(())
    }

    async fn handle_message(
        &mut self,
        msg: ToIntegrationMessage,
    ) -> Result<(), Box<dyn Error + Send>> {
        let entity_id = msg.entity_id().to_string();
        let mut entities = self.entities.lock().await;
        let entity = entities
            .get_mut(&entity_id)
            .ok_or_else(|| not_found(format!("Unknown entity: {}", entity_id)))?;
        let platform = entity.platform();

        let result = match (&mut *entity, msg) {
            (DuerosEntity::Light(light), ToIntegrationMessage::Light { command, .. }) => {
                light.handle_command(command).await
            }
            (DuerosEntity::Cover(cover), ToIntegrationMessage::Cover { command, .. }) => {
                cover.handle_command(command).await
            }
            _ => {
                return Err(not_found(format!(
                    "Command does not apply to {} entity {}",
                    platform, entity_id
                )));
            }
        };

        // Report the optimistic state whether or not the remote accepted the command
        let state = entity.state_message();
        drop(entities);
        self.send(state).await;

        result.map_err(|e| -> Box<dyn Error + Send> { Box::new(e) })
    }

    async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send>> {
        info!("Shutting down {}", self.name);
        for task in self.tasks.drain(..) {
            task.abort();
        }
        Ok(())
    }
}

impl<C: DuerosClient + 'static> Drop for DuerosIntegration<C> {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::engine::LightCommand;
    use crate::engine::Platform;
    use crate::integrations::dueros::client::MockCall;
    use crate::integrations::dueros::client::MockDuerosClient;
    use crate::integrations::dueros::model::Status;
    use crate::integrations::dueros::testing;

    fn integration() -> DuerosIntegration<MockDuerosClient> {
        let client = MockDuerosClient::new(vec![
            testing::light("bot-a", "lamp").name("Desk Lamp").on(false).build(),
            testing::curtain("bot-a", "curtain").on(true).degree(40).build(),
        ]);
        DuerosIntegration::new("home", client, Duration::from_secs(300))
    }

    async fn next(rx: &mut mpsc::Receiver<FromIntegrationMessage>) -> FromIntegrationMessage {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_setup_discovers_entities() {
        let mut integration = integration();
        let (tx, mut rx) = mpsc::channel(16);

        integration.setup(tx).await.unwrap();
        assert_eq!(integration.name(), "dueros.home");

        let mut discovered = Vec::new();
        for _ in 0..4 {
            if let FromIntegrationMessage::EntityDiscovered {
                entity_id,
                platform,
                integration_name,
                ..
            } = next(&mut rx).await
            {
                assert_eq!(integration_name, "dueros.home");
                discovered.push((entity_id, platform));
            }
        }
        assert_eq!(
            discovered,
            vec![
                ("cover.dueros_bot_a_curtain".to_string(), Platform::Cover),
                ("light.dueros_bot_a_lamp".to_string(), Platform::Light),
            ]
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_setup_fails_when_session_rejected() {
        let mut integration = integration();
        integration
            .coordinator
            .client()
            .set_device_list_status(Status::NotLogin, "not logged in");
        let (tx, mut rx) = mpsc::channel(16);

        let err = integration.setup(tx).await.unwrap_err();

        assert!(err.to_string().contains("not logged in"));
        assert!(rx.try_recv().is_err());
        assert!(integration.entities.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_command_reports_state() {
        let mut integration = integration();
        let (tx, mut rx) = mpsc::channel(16);
        integration.setup(tx).await.unwrap();
        for _ in 0..4 {
            next(&mut rx).await;
        }

        integration
            .handle_message(ToIntegrationMessage::Light {
                entity_id: "light.dueros_bot_a_lamp".to_string(),
                command: LightCommand::TurnOn {
                    brightness: Some(255),
                    color_temp_kelvin: None,
                },
            })
            .await
            .unwrap();

        assert_eq!(
            integration.coordinator.client().action_calls(),
            vec![
                MockCall::SetBrightnessPercentage("lamp".to_string(), 100),
                MockCall::TurnOn("lamp".to_string()),
            ]
        );
        match next(&mut rx).await {
            FromIntegrationMessage::LightStateChanged { entity_id, state } => {
                assert_eq!(entity_id, "light.dueros_bot_a_lamp");
                assert!(state.on);
                assert_eq!(state.brightness, Some(255));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_command_for_unknown_or_mismatched_entity() {
        let mut integration = integration();
        let (tx, _rx) = mpsc::channel(16);
        integration.setup(tx).await.unwrap();

        let err = integration
            .handle_message(ToIntegrationMessage::Light {
                entity_id: "light.dueros_missing".to_string(),
                command: LightCommand::TurnOff,
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unknown entity"));

        let err = integration
            .handle_message(ToIntegrationMessage::Light {
                entity_id: "cover.dueros_bot_a_curtain".to_string(),
                command: LightCommand::TurnOff,
            })
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Command does not apply to cover entity cover.dueros_bot_a_curtain"
        );
        assert!(integration.coordinator.client().action_calls().is_empty());
    }

    #[tokio::test]
    async fn test_new_snapshot_updates_entities() {
        let mut integration = integration();
        let (tx, mut rx) = mpsc::channel(16);
        integration.setup(tx).await.unwrap();
        for _ in 0..4 {
            next(&mut rx).await;
        }

        // The curtain disappears and the lamp is switched on elsewhere
        integration
            .coordinator
            .client()
            .set_appliances(vec![testing::light("bot-a", "lamp").on(true).build()]);
        integration.coordinator.refresh().await.unwrap();

        let mut cover_available = None;
        let mut light_on = None;
        for _ in 0..2 {
            match next(&mut rx).await {
                FromIntegrationMessage::CoverStateChanged { state, .. } => {
                    cover_available = Some(state.available)
                }
                FromIntegrationMessage::LightStateChanged { state, .. } => light_on = Some(state.on),
                other => panic!("unexpected message: {:?}", other),
            }
        }
        assert_eq!(cover_available, Some(false));
        assert_eq!(light_on, Some(true));

        integration.shutdown().await.unwrap();
    }
}
