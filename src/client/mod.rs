pub mod cooldown;
pub mod session;
pub mod store;
pub mod terminal;
pub mod transport;
