pub mod dispatch;
pub mod error;
pub mod federation;
pub mod files;
pub mod forward;
pub mod mgmt;
pub mod registry;
pub mod server;
pub mod stats;
pub mod transport;

pub use error::SnError;
pub use server::{SnConfig, SnServer, Supernode};
