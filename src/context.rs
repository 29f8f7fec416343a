use std::sync::Arc;

use crate::auth::TokenVerifier;
use crate::config::Config;
use crate::registry::ConnectionRegistry;
use crate::resolver::ChannelResolver;
use crate::router::MessageRouter;
use crate::store::MessageStore;

/// Application context containing shared dependencies
/// This reduces parameter passing and makes it easier to add new dependencies
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub auth: Arc<dyn TokenVerifier>,
    /// Owned here for the whole process lifetime; reached only through
    /// register/unregister/lookup.
    pub registry: Arc<ConnectionRegistry>,
    pub router: Arc<MessageRouter>,
    pub messages: Arc<dyn MessageStore>,
    pub resolver: ChannelResolver,
}

impl AppContext {
    pub fn new(
        config: Arc<Config>,
        auth: Arc<dyn TokenVerifier>,
        registry: Arc<ConnectionRegistry>,
        router: Arc<MessageRouter>,
        messages: Arc<dyn MessageStore>,
        resolver: ChannelResolver,
    ) -> Self {
        Self {
            config,
            auth,
            registry,
            router,
            messages,
            resolver,
        }
    }
}
