pub mod aggregate;
pub mod value_objects;

pub use aggregate::*;
pub use value_objects::*;
