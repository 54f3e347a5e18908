pub mod app_config;
pub mod error;
pub mod store;

pub use app_config::*;
pub use error::*;
pub use store::*;
