pub mod errors;
pub mod experiment;
pub mod parameter;

pub use errors::*;
pub use experiment::*;
pub use parameter::*;
