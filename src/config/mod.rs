mod settings;

pub use settings::{
    DatabaseConfig, DispatcherConfig, EmailConfig, Settings, SmsConfig, StoreConfig,
    WebhookConfig,
};
