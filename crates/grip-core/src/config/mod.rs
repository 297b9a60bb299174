pub mod loader;
pub mod schema;
pub mod secret;

pub use loader::{default_config_path, load_config, save_config};
pub use schema::GripConfig;
pub use secret::Secret;
