pub mod error;
pub mod events;
pub mod health;
pub mod session;

pub use error::*;
pub use events::*;
pub use health::*;
pub use session::*;
