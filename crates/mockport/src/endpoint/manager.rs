//! EndpointManager - lifecycle management for mock endpoints.
//!
//! The manager owns every endpoint definition and the live server behind each
//! running one. All mutations happen under a single async lock, which is held
//! across starting and stopping servers so operations never interleave.

use super::error::EndpointError;
use super::types::{
    CreateEndpointRequest, EndpointDefinition, EndpointStatus, Protocol, UpdateEndpointRequest,
};
use crate::config::Settings;
use crate::server::{self, ProtocolServer};
use crate::store::EndpointStore;
use futures::future::join_all;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Default)]
struct State {
    endpoints: HashMap<String, EndpointDefinition>,
    servers: HashMap<String, Box<dyn ProtocolServer>>,
}

impl State {
    fn port_taken(&self, port: u16) -> bool {
        self.endpoints
            .values()
            .any(|e| e.port == port && e.is_running())
    }

    fn snapshot(&self) -> Vec<EndpointDefinition> {
        let mut endpoints: Vec<_> = self.endpoints.values().cloned().collect();
        endpoints.sort_by(|a, b| a.port.cmp(&b.port).then_with(|| a.id.cmp(&b.id)));
        endpoints
    }
}

/// Manages the lifecycle of all mock endpoints
pub struct EndpointManager {
    settings: Settings,
    store: EndpointStore,
    state: Mutex<State>,
}

impl EndpointManager {
    /// Open the store under `settings.data_dir` and start every persisted endpoint.
    ///
    /// An unreadable store is an error. Endpoints that fail to start are kept
    /// as stopped definitions.
    pub async fn open(settings: Settings) -> Result<Self, EndpointError> {
        let store = EndpointStore::new(settings.store_path());
        let definitions = store.load()?;

        let manager = Self {
            settings,
            store,
            state: Mutex::new(State::default()),
        };
        manager.restore(definitions).await;
        Ok(manager)
    }

    async fn restore(&self, definitions: Vec<EndpointDefinition>) {
        let mut state = self.state.lock().await;
        for mut definition in definitions {
            definition.status = EndpointStatus::Stopped;
            definition.apply_protocol_defaults(&self.settings);

            let mut server = server::build(&definition, &self.settings);
            match server.start().await {
                Ok(()) => {
                    definition.status = EndpointStatus::Running;
                    state.servers.insert(definition.id.clone(), server);
                    info!(
                        "Loaded and started endpoint {} ({}) on port {}",
                        definition.name, definition.id, definition.port
                    );
                }
                Err(e) => {
                    warn!(
                        "Failed to start endpoint {} ({}): {}",
                        definition.name, definition.id, e
                    );
                }
            }
            state.endpoints.insert(definition.id.clone(), definition);
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Create and start an endpoint
    pub async fn create(
        &self,
        req: CreateEndpointRequest,
    ) -> Result<EndpointDefinition, EndpointError> {
        let protocol: Protocol = req
            .protocol
            .parse()
            .map_err(EndpointError::UnsupportedProtocol)?;
        if req.port == 0 {
            return Err(EndpointError::InvalidPort(req.port));
        }

        let mut state = self.state.lock().await;
        if state.port_taken(req.port) {
            return Err(EndpointError::PortInUse(req.port));
        }

        let id = Uuid::new_v4().to_string();
        let mut definition = EndpointDefinition::from_request(id, protocol, req, &self.settings);

        let mut server = server::build(&definition, &self.settings);
        server
            .start()
            .await
            .map_err(|source| EndpointError::StartFailed {
                port: definition.port,
                source,
            })?;

        definition.status = EndpointStatus::Running;
        state.servers.insert(definition.id.clone(), server);
        state
            .endpoints
            .insert(definition.id.clone(), definition.clone());
        self.persist(&state);

        info!(
            "Created {} endpoint {} ({}) on port {}",
            definition.protocol, definition.name, definition.id, definition.port
        );
        Ok(definition)
    }

    /// Get an endpoint by id
    pub async fn get(&self, id: &str) -> Result<EndpointDefinition, EndpointError> {
        let state = self.state.lock().await;
        state
            .endpoints
            .get(id)
            .cloned()
            .ok_or_else(|| EndpointError::NotFound(id.to_string()))
    }

    /// List all endpoints, ordered by port then id
    pub async fn list(&self) -> Vec<EndpointDefinition> {
        self.state.lock().await.snapshot()
    }

    /// Apply a partial update, restarting the endpoint if it is running.
    ///
    /// When the restart fails the endpoint is left stopped with the new
    /// settings, and that state is persisted before the error is returned.
    pub async fn update(
        &self,
        id: &str,
        req: UpdateEndpointRequest,
    ) -> Result<EndpointDefinition, EndpointError> {
        let mut state = self.state.lock().await;
        let mut updated = state
            .endpoints
            .get(id)
            .cloned()
            .ok_or_else(|| EndpointError::NotFound(id.to_string()))?;
        updated.apply_update(req);

        if updated.is_running() {
            if let Some(mut old) = state.servers.remove(id) {
                if let Err(source) = old.stop().await {
                    state.servers.insert(id.to_string(), old);
                    return Err(EndpointError::RestartFailed {
                        id: id.to_string(),
                        source,
                    });
                }
            }

            let mut server = server::build(&updated, &self.settings);
            if let Err(source) = server.start().await {
                updated.status = EndpointStatus::Stopped;
                state.endpoints.insert(id.to_string(), updated);
                self.persist(&state);
                error!("Endpoint {} stopped after failed restart: {}", id, source);
                return Err(EndpointError::RestartFailed {
                    id: id.to_string(),
                    source,
                });
            }
            state.servers.insert(id.to_string(), server);
        }

        state.endpoints.insert(id.to_string(), updated.clone());
        self.persist(&state);
        info!("Updated endpoint {} ({})", updated.name, id);
        Ok(updated)
    }

    /// Delete an endpoint, stopping it first.
    ///
    /// The definition is removed even when stopping fails; the stop error is
    /// still reported.
    pub async fn delete(&self, id: &str) -> Result<(), EndpointError> {
        let mut state = self.state.lock().await;
        let definition = state
            .endpoints
            .remove(id)
            .ok_or_else(|| EndpointError::NotFound(id.to_string()))?;

        let stopped = match state.servers.remove(id) {
            Some(mut server) => server.stop().await,
            None => Ok(()),
        };
        self.persist(&state);

        info!(
            "Endpoint {} ({}) on port {} deleted",
            definition.name, id, definition.port
        );
        stopped.map_err(|source| EndpointError::StopFailed {
            id: id.to_string(),
            source,
        })
    }

    /// Absolute root directory served by an FTP or SFTP endpoint.
    pub async fn root_dir(&self, id: &str) -> Result<PathBuf, EndpointError> {
        let definition = self.get(id).await?;
        let root = definition
            .file_root()
            .map(PathBuf::from)
            .ok_or_else(|| EndpointError::NoFileRoot(id.to_string()))?;
        Ok(std::path::absolute(&root).unwrap_or(root))
    }

    /// Stop every live server. Persisted definitions are left untouched so
    /// the same set comes back on the next start.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        let servers: Vec<_> = state.servers.drain().collect();
        let results = join_all(servers.into_iter().map(|(id, mut server)| async move {
            (id, server.stop().await)
        }))
        .await;

        for (id, result) in results {
            if let Err(e) = result {
                warn!("Failed to stop endpoint {} during shutdown: {}", id, e);
            }
        }
        info!("All endpoints stopped");
    }

    fn persist(&self, state: &State) {
        if let Err(e) = self.store.save(&state.snapshot()) {
            warn!("Failed to save endpoints to {:?}: {}", self.store.path(), e);
        }
    }
}
