pub mod config;
pub mod session;
pub mod storage;
pub mod transport;

// Optional prelude for convenient imports
pub mod prelude {
    pub use super::config::ConfigError;
    pub use super::session::SessionError;
    pub use super::storage::StorageError;
    pub use super::transport::TransportError;
}
