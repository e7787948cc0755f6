pub mod actors;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod models;
pub mod rendezvous;
pub mod server;
pub mod signaling;
