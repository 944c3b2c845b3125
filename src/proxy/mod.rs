mod auth;
pub mod core;
mod gate;
mod handlers;
mod logging;
mod models;
mod resolve;
mod route;
mod router;
mod util;

pub use router::{create_proxy_router, no_cache};
