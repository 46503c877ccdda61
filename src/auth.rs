//! Secret wrappers and the cached credential model.

pub mod credential;
pub mod secret;

pub use credential::*;
pub use secret::*;
