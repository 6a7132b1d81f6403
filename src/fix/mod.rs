//! Fix descriptors and their generation.

mod descriptor;
mod generator;

pub use descriptor::{FileChange, FixDescriptor};
pub use generator::{FixGenerator, FixTarget, build_prompt};
