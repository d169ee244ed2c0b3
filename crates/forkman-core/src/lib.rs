mod config;
mod digest;
mod error;
mod interrupt;
mod layout;
mod logging;
mod names;
mod retry;

pub use config::{default_config_path, ForkmanConfig, CONFIG_ENV_VAR};
pub use digest::sha256_hex;
pub use error::ForkError;
pub use interrupt::{is_interrupted, request_interrupt};
pub use layout::{current_unix_timestamp, ForksLayout, NESTED_REPO_DIR};
pub use logging::{init_logging, rotate_if_needed, rotated_log_path, RotatingLogFile};
pub use names::validate_variant_name;
pub use retry::RetryPolicy;

#[cfg(test)]
mod tests;
