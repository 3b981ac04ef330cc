pub mod await_ready;
pub mod config;
pub mod name;
pub mod quota;
pub mod render;
pub mod token;
