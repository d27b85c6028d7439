pub mod common;
pub mod entity;
pub mod filter;
pub mod mutation;
pub mod path;
pub mod plan;
pub mod schema;

pub use common::*;
pub use entity::*;
pub use filter::*;
pub use mutation::*;
pub use path::*;
pub use plan::*;
pub use schema::*;
