pub mod aws;
pub mod backend;
pub mod config;
pub mod ecs;
pub mod eks;
pub mod envfile;
pub mod error;
pub mod exec;
pub mod inject;
pub mod io;
pub mod migrate;
pub mod paths;
pub mod provision;
pub mod pulumi;
pub mod secrets;
pub mod session;
pub mod types;
pub mod verify;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Result, StackshiftError};
