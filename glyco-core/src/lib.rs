mod component;
pub mod solve;

pub use component::Component;
