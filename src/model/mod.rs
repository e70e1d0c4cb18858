pub mod change_log;
pub mod common;
pub mod filter;
pub mod instance;
pub mod instance_relation;
pub mod query;
pub mod relation;
pub mod schema;
pub mod user_context;

pub use change_log::*;
pub use common::*;
pub use filter::*;
pub use instance::*;
pub use instance_relation::*;
pub use query::*;
pub use relation::*;
pub use schema::*;
pub use user_context::*;
