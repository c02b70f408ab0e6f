pub mod health;
pub mod sync;
pub mod tickets;
