pub mod config;
pub mod error;
pub mod ingest;
pub mod middleware;
pub mod registry;
pub mod router;
pub mod simulator;
pub mod websocket;


pub use router::{create_router, AppState};
