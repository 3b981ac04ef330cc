pub mod config;
pub mod error;
pub mod gate;
pub mod io;
pub mod kubectl;
pub mod manifest;
pub mod naming;
pub mod paths;
pub mod quota;
pub mod token_store;

pub use error::{BinderError, Result};
