use std::sync::Arc;

use crate::{config::AppConfig, token_store::CredentialStore};

/// Shared across requests. The credential store is the only mutable piece,
/// and it lives outside the process conceptually; tokens are loaded per request.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub client: reqwest::Client,
    pub store: Arc<dyn CredentialStore>,
}

impl AppState {
    pub fn new(config: AppConfig, client: reqwest::Client, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            config: Arc::new(config),
            client,
            store,
        }
    }
}
