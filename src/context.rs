use std::sync::Arc;

use crate::clients::{Authorizer, HttpAuthorizationClient, HttpUserClient, UserDirectory};
use crate::config::AppConfig;
use crate::store::Store;

/// Everything a request handler needs: persistence, the two collaborating
/// services and the loaded configuration
pub struct AppContext<S: Store> {
    pub store: Arc<S>,
    pub users: Arc<dyn UserDirectory>,
    pub authorizer: Arc<dyn Authorizer>,
    pub config: AppConfig,
}

pub type AppState<S> = Arc<AppContext<S>>;

impl<S: Store> AppContext<S> {
    pub fn new(
        store: Arc<S>,
        users: Arc<dyn UserDirectory>,
        authorizer: Arc<dyn Authorizer>,
        config: AppConfig,
    ) -> Self {
        Self {
            store,
            users,
            authorizer,
            config,
        }
    }

    /// Wire the HTTP clients from `config.services`
    pub fn from_config(store: Arc<S>, config: AppConfig) -> Self {
        let users = Arc::new(HttpUserClient::new(config.services.user_url.clone()));
        let authorizer = Arc::new(HttpAuthorizationClient::new(
            config.services.authorization_url.clone(),
        ));
        Self::new(store, users, authorizer, config)
    }
}
