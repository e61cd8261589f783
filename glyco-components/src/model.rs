pub mod dynamics;
pub mod minimal;
