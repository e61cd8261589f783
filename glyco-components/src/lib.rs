pub mod input;
pub mod model;
pub mod schedule;
pub mod solver;
