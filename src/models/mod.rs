pub mod api;
pub mod records;

pub use api::*;
pub use records::*;
