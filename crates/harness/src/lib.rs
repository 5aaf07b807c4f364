pub mod client;
pub mod logging;
pub mod network;

pub use client::TestClient;
pub use network::{NetworkConfig, SentBatch, SimulatedNetwork};
