//! Frontend-facing gateway: aggregation router and stdio server loop

pub mod router;
pub mod server;

pub use router::Router;
pub use server::Hub;
