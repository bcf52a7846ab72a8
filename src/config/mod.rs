pub mod app_config;

pub use app_config::{
    AppConfig, DatabaseConfig, EventsConfig, LoggingConfig, PaginationConfig, ServerConfig,
    CONFIG_FILE_NAME,
};
