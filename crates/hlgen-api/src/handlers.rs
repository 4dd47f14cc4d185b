//! Request handlers.

pub mod health;
pub mod pages;
pub mod sessions;

pub use health::*;
pub use pages::*;
pub use sessions::*;
