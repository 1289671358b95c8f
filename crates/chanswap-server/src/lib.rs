pub mod client;
pub mod event_bridge;
pub mod handlers;
pub mod rpc;
pub mod server;

pub use client::ClientRegistry;
pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
