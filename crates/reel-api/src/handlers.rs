//! Request handlers.

pub mod functions;
pub mod health;
pub mod scenes;

pub use functions::*;
pub use health::*;
pub use scenes::*;
