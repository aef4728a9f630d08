mod event;
pub mod handlers;

pub use event::{cors_headers, GatewayEvent, GatewayResponse};
pub use handlers::handle;
