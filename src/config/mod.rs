mod settings;

pub use settings::{
    DispatchConfig, LoggingConfig, NotificationStyleConfig, ProviderConfig, ServerConfig,
    Settings,
};
