use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::entity::Platform;
use super::integration::CommandEnvelope;
use super::integration::CommandResult;
use super::integration::FromIntegrationReceiver;
use super::integration::FromIntegrationSender;
use super::integration::Integration;
use super::integration::IntegrationContext;
use super::integration::ToIntegrationSender;
use super::message::FromIntegrationMessage;
use super::message::ToIntegrationMessage;
use super::state::EntityInfo;
use super::state::State;

/// Errors raised while routing a command to an integration.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("No integration found for entity: {0}")]
    UnknownEntity(String),

    #[error("Integration {0} is not running")]
    IntegrationUnavailable(String),

    #[error("{entity_id} is a {actual} entity, not a {requested} entity")]
    WrongPlatform {
        entity_id: String,
        actual: Platform,
        requested: Platform,
    },
}

/// duerosd engine
///
/// This structure handles the flow of events, sending commands to the correct integration,
/// and maintaining a view of the world with State.
pub struct Engine {
    /// Centralized state snapshot (readers load the Arc, writer stores a new one)
    state: ArcSwap<State>,

    /// Map of entity_id -> integration name for routing messages
    entity_integration_map: std::sync::Mutex<HashMap<String, String>>,

    /// Communication channels to integrations (for commands)
    integration_channels: HashMap<String, ToIntegrationSender>,

    /// Receive messages from integrations (events)
    message_rx: Mutex<FromIntegrationReceiver>,

    /// Sender for integrations to report events back to the engine
    message_tx: FromIntegrationSender,

    /// Handles for integration tasks
    integration_handles: Vec<JoinHandle<()>>,
}

/// Capacity for the integration→engine message channel
/// Provides backpressure when integrations send faster than the engine can process
const FROM_INTEGRATION_CHANNEL_SIZE: usize = 1024;

impl Engine {
    /// Create a new Engine instance
    pub fn new() -> Self {
        let (message_tx, message_rx) = mpsc::channel(FROM_INTEGRATION_CHANNEL_SIZE);
        Self {
            state: ArcSwap::new(Arc::default()),
            entity_integration_map: std::sync::Mutex::new(HashMap::new()),
            integration_channels: HashMap::new(),
            message_rx: Mutex::new(message_rx),
            message_tx,
            integration_handles: Vec::new(),
        }
    }

    /// Register integrations from configuration
    ///
    /// Runs every factory in the integration registry against the config and registers
    /// whatever they produce. A failing factory is logged and skipped.
    pub fn register_integrations_from_config(&mut self, cfg: &crate::config::Config) {
        let ctx = IntegrationContext { config: cfg };
        for constr in super::integration::REGISTRY {
            let integrations = match constr(&ctx) {
                Ok(i) => i,
                Err(e) => {
                    error!("failed to setup integration: {:#}", e);
                    continue;
                }
            };
            for integration in integrations {
                let name = integration.name().to_string();
                self.register_integration(name, integration);
            }
        }
    }

    /// Register an integration with the engine
    ///
    /// This spawns the integration in a background task, wires up channels,
    /// and starts its setup process.
    pub fn register_integration(&mut self, name: String, mut integration: Box<dyn Integration>) {
        let (to_integration_tx, mut to_integration_rx) =
            mpsc::unbounded_channel::<CommandEnvelope>();
        let from_integration_tx = self.message_tx.clone();

        self.integration_channels
            .insert(name.clone(), to_integration_tx);

        // Spawn integration task
        let handle = tokio::spawn(async move {
            // Setup integration (gives it the sender for events)
            if let Err(e) = integration.setup(from_integration_tx).await {
                warn!("Integration '{}' setup failed: {}", name, e);
                return;
            }

            // Process commands from engine, one at a time
            while let Some(envelope) = to_integration_rx.recv().await {
                let result = integration
                    .handle_message(envelope.message)
                    .await
                    .map_err(|e| e.to_string());
                if let Err(e) = &result {
                    warn!("Integration '{}' failed to handle message: {}", name, e);
                }
                // The issuer may have stopped waiting for the result
                let _ = envelope.respond_to.send(result);
            }

            if let Err(e) = integration.shutdown().await {
                warn!("Integration '{}' shutdown failed: {}", name, e);
            }
        });

        self.integration_handles.push(handle);
    }

    /// Send a command to an integration
    ///
    /// Routes the command to the appropriate integration based on entity_id. The returned
    /// receiver resolves once the integration has executed the command.
    pub fn send_command(
        &self,
        msg: ToIntegrationMessage,
    ) -> Result<oneshot::Receiver<CommandResult>, EngineError> {
        let entity_id = msg.entity_id().to_string();

        // Route to the integration that owns this entity
        let integration_name = {
            let map = self
                .entity_integration_map
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            map.get(&entity_id)
                .cloned()
                .ok_or_else(|| EngineError::UnknownEntity(entity_id.clone()))?
        };

        if let Some(info) = self.state.load().entities.get(&entity_id) {
            if info.platform != msg.platform() {
                return Err(EngineError::WrongPlatform {
                    entity_id,
                    actual: info.platform,
                    requested: msg.platform(),
                });
            }
        }

        let tx = self
            .integration_channels
            .get(&integration_name)
            .ok_or_else(|| EngineError::IntegrationUnavailable(integration_name.clone()))?;

        let (respond_to, response_rx) = oneshot::channel();
        tx.send(CommandEnvelope {
            message: msg,
            respond_to,
        })
        .map_err(|_| EngineError::IntegrationUnavailable(integration_name))?;

        Ok(response_rx)
    }

    /// Send a command and wait for its outcome
    pub async fn execute_command(&self, msg: ToIntegrationMessage) -> Result<CommandResult, EngineError> {
        let entity_id = msg.entity_id().to_string();
        let rx = self.send_command(msg)?;
        rx.await
            .map_err(|_| EngineError::IntegrationUnavailable(entity_id))
    }

    /// Run the engine's main event loop
    ///
    /// Processes incoming events from integrations and updates state.
    pub async fn run(&self) {
        info!("Engine starting");

        // Main event loop - only receives FromIntegration messages
        let mut rx = self.message_rx.lock().await;
        while let Some(msg) = rx.recv().await {
            self.handle_event(msg);
        }

        info!("Engine shutting down");
    }

    /// Get a snapshot of the current engine state.
    ///
    /// Clones the `Arc` (atomic refcount bump), essentially free.
    pub fn state_snapshot(&self) -> Arc<State> {
        self.state.load_full()
    }

    fn update_state(&self, f: impl FnOnce(&mut State)) {
        let mut state = State::clone(&self.state.load());
        f(&mut state);
        self.state.store(Arc::new(state));
    }

    /// Handle an event from an integration
    fn handle_event(&self, msg: FromIntegrationMessage) {
        match msg {
            FromIntegrationMessage::EntityDiscovered {
                entity_id,
                unique_id,
                name,
                platform,
                device,
                integration_name,
            } => {
                info!(
                    "Entity discovered: {} ({}, from {})",
                    entity_id, name, integration_name
                );

                // Record which integration owns this entity for command routing.
                {
                    let mut map = self
                        .entity_integration_map
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                    map.insert(entity_id.clone(), integration_name.clone());
                }

                self.update_state(|state| {
                    state.entities.insert(
                        entity_id,
                        EntityInfo {
                            unique_id,
                            name,
                            platform,
                            integration: integration_name,
                            device,
                        },
                    );
                });
            }
            FromIntegrationMessage::LightStateChanged { entity_id, state } => {
                info!(
                    "Light state changed: {} -> available={}, on={}, brightness={:?}, color_temp={:?}",
                    entity_id, state.available, state.on, state.brightness, state.color_temp_kelvin
                );
                self.update_state(|s| {
                    s.lights.insert(entity_id, state);
                });
            }
            FromIntegrationMessage::CoverStateChanged { entity_id, state } => {
                info!(
                    "Cover state changed: {} -> available={}, closed={:?}, position={:?}",
                    entity_id, state.available, state.closed, state.position
                );
                self.update_state(|s| {
                    s.covers.insert(entity_id, state);
                });
            }
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        for handle in self.integration_handles.drain(..) {
            handle.abort();
        }
    }
}
