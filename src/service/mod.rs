pub mod app_state;
pub mod model_sync;
pub mod retention;
pub mod secret;
pub mod store;
