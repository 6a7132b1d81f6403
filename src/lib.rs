pub mod completion;
pub mod config;
pub mod context;
pub mod dashboard;
pub mod errors;
pub mod events;
pub mod fix;
pub mod hosting;
pub mod orchestrator;
pub mod patch;
pub mod recovery;
pub mod util;
pub mod verifier;
pub mod verify;
pub mod workspace;

#[cfg(test)]
mod testing;
