pub mod executor;
pub mod session_service;

pub use executor::*;
pub use session_service::*;
