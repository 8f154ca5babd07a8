pub mod cat;
pub mod common;
pub mod config;
pub mod map;
pub mod planner;
pub mod scenario;
pub mod stat;

pub use common::{Agent, Path};
pub use planner::{DynamicConstraintManager, LpaStar};
