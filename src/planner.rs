mod dcm;
mod lpastar;

pub use dcm::DynamicConstraintManager;
pub use lpastar::LpaStar;
