pub mod auth;

pub use auth::SyncAuth;
