pub mod authorization;
pub mod user_client;

pub use authorization::*;
pub use user_client::*;
