//! Manipulate JVM method bodies
//!
//! ### Simple example
//!
//! Consider injecting a fragment that was lifted out of another instance method taking a `long`.
//! The fragment keeps a counter in slot 3, but in the host method that slot is already taken by a
//! scratch local. Splicing the fragment through a [`code::CodeLocalsShifter`] moves the counter
//! to a fresh slot:
//!
//! ```
//! use classweave::jvm::code::*;
//! use classweave::jvm::*;
//!
//! # fn inject() -> Result<(), Error> {
//! let host_descriptor = MethodDescriptor::parse("(J)V")?;
//! let host_flags = MethodAccessFlags::PUBLIC;
//! let mut code = DirectCodeBuilder::new(host_flags, &host_descriptor)?;
//! let scratch = code.allocate_local(TypeKind::Int)?;
//! assert_eq!(scratch, 3);
//!
//! // The foreign fragment, in its own local numbering
//! let fragment = vec![
//!     CodeElement::Constant(ConstantInstruction::Int(0)),
//!     CodeElement::Store(TypeKind::Int, 3),
//!     CodeElement::Increment(3, 1),
//! ];
//!
//! let shifter = CodeLocalsShifter::of(host_flags, &host_descriptor)?;
//! code.transform_elements(fragment, shifter)?;
//! code.return_(TypeKind::Void)?;
//!
//! let body = code.finish()?;
//! assert_eq!(body.code, vec![0x03, 0x36, 0x04, 0x84, 0x04, 0x01, 0xb1]);
//! assert_eq!(body.max_locals, 5); // `this`, the `long`, the scratch local, and the counter
//! # Ok(())
//! # }
//! # inject().unwrap();
//! ```

mod access_flags;
pub mod code;
mod descriptors;
mod errors;
mod names;
mod type_kind;

pub use access_flags::*;
pub use descriptors::*;
pub use errors::*;
pub use names::*;
pub use type_kind::*;
