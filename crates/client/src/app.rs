//! Composition root.
//!
//! Builds exactly one real-time client, one task store and one dashboard state
//! per application, and wires the store listeners to the bus.

use std::sync::Arc;

use crate::application::services::TaskService;
use crate::client::RealtimeClient;
use crate::config::ClientConfig;
use crate::infrastructure::messaging::Listener;
use crate::infrastructure::websocket::Connector;
use crate::infrastructure::HttpTaskApi;
use crate::ports::outbound::TaskApiPort;
use crate::state::{DashboardState, TaskStore};

/// Everything the dashboard needs, constructed once
#[derive(Clone)]
pub struct App {
    pub config: ClientConfig,
    pub client: RealtimeClient,
    pub tasks: TaskStore,
    pub dashboard: DashboardState,
    pub task_service: TaskService,
    listeners: Vec<(&'static str, Listener)>,
}

impl App {
    /// Wire the production adapters: tokio-tungstenite and reqwest.
    pub fn build(config: ClientConfig) -> Self {
        let client = RealtimeClient::websocket(&config);
        let api: Arc<dyn TaskApiPort> = Arc::new(HttpTaskApi::new(&config.api_url));
        Self::assemble(config, client, api)
    }

    /// Wire arbitrary adapters (tests, alternative transports).
    pub fn with_adapters(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        api: Arc<dyn TaskApiPort>,
    ) -> Self {
        let client = RealtimeClient::new(&config, connector);
        Self::assemble(config, client, api)
    }

    fn assemble(config: ClientConfig, client: RealtimeClient, api: Arc<dyn TaskApiPort>) -> Self {
        let tasks = TaskStore::new();
        let dashboard = DashboardState::new();
        let listeners = vec![
            (
                fuzzboard_protocol::events::TASK_UPDATE,
                tasks.attach(client.bus()),
            ),
            (
                fuzzboard_protocol::events::DASHBOARD_UPDATE,
                dashboard.attach(client.bus()),
            ),
        ];
        let task_service = TaskService::new(api, tasks.clone(), dashboard.clone());

        tracing::debug!(ws_url = %config.ws_url, api_url = %config.api_url, "Application assembled");
        Self {
            config,
            client,
            tasks,
            dashboard,
            task_service,
            listeners,
        }
    }

    /// Disconnect and detach the store listeners.
    pub fn shutdown(&self) {
        self.client.disconnect();
        for (event, callback) in &self.listeners {
            self.client.off(event, callback);
        }
    }
}
