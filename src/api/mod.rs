pub mod change_log_handlers;
pub mod docs;
pub mod extract;
pub mod graphql;
pub mod handlers;
pub mod relation_handlers;
pub mod routes;
pub mod user_extractor;

pub use routes::*;
