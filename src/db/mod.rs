pub mod catalog;
pub mod claims;
pub mod connection;
pub mod errors;
pub mod orders;
pub mod settings;
pub mod users;

pub use connection::*;
pub use errors::*;
