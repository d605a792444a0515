pub mod converter;
pub mod docker;
pub mod error;
pub mod runtime;

pub use converter::*;
pub use docker::*;
pub use error::*;
pub use runtime::*;
