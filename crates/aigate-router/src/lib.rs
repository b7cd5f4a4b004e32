//! Inbound proxy surface: one route per supported dialect, with auth,
//! model-prefix stripping and limit enforcement layered in front of the
//! handlers.

pub mod context;
pub mod middleware;
pub mod proxy;

pub use context::RequestContext;
pub use proxy::{proxy_router, ProxyState};
