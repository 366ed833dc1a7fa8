pub mod client;
pub mod tcp;
pub mod traits;

pub use client::TransportClient;
pub use tcp::TcpConnector;
pub use traits::{TransportConnector, TransportStream};
