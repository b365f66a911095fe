//! Build, splice, and rewrite JVM method bodies
//!
//! Method code is produced by pushing [`jvm::code::CodeElement`]s through a chain of builders.
//! The innermost builder of every chain is a terminal (see [`jvm::code::DirectCodeBuilder`] and
//! [`jvm::code::BufferedCodeBuilder`]) which materializes the bytecode. Everything layered on top
//! of it either rewrites elements on the way through (transforms, such as
//! [`jvm::code::CodeLocalsShifter`]) or adds structure (blocks).

pub mod jvm;
pub mod util;
