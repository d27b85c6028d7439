pub mod config;
pub mod logic;
pub mod model;
pub mod seed;
pub mod store;

pub use logic::{parse_and_apply_mutation, parse_and_build_query};
