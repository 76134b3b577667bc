pub mod connection;
pub mod presence;
pub mod reactor;
pub mod registry;
pub mod router;
