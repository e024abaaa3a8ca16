use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::notification::NotificationDispatcher;
use crate::provider::MessagingProvider;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub start_time: Instant,
}

impl AppState {
    /// Build the state around an already constructed provider
    pub fn new(settings: Settings, provider: Arc<dyn MessagingProvider>) -> Self {
        let dispatcher = Arc::new(NotificationDispatcher::new(
            provider,
            settings.notification.clone(),
        ));

        Self {
            settings: Arc::new(settings),
            dispatcher,
            start_time: Instant::now(),
        }
    }
}
