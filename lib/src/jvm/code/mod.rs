//! Composable method body builders
//!
//! ### Structure
//!
//! A method body is a stream of [`CodeElement`]s: instructions, plus pseudo-elements like label
//! positions and debug entries. Elements are pushed into a [`CodeBuilder`], which is either a
//! terminal that materializes them or a builder that forwards them to the next builder in a
//! chain:
//!
//!   - [`DirectCodeBuilder`] encodes bytecode on the fly (single pass)
//!   - [`BufferedCodeBuilder`] keeps the elements around and encodes them at the end
//!   - [`BlockCodeBuilder`] scopes a region with its own break label and local slots
//!   - [`TransformingCodeBuilder`] and [`ChainedCodeBuilder`] run a [`CodeTransform`] over
//!     everything passing through them
//!
//! The chain is a straight line of mutable borrows ending at the terminal, so walking it (see
//! [`terminal`] and [`top_local`]) is just following parents.
//!
//! ### Injecting code
//!
//! [`CodeLocalsShifter`] is the transform to use when splicing a fragment of one method body into
//! another: it moves the fragment's locals into fresh slots so they don't clobber the host's.

mod block;
mod builder;
mod element;
mod label;
mod locals_shifter;
mod terminal;
mod transform;

pub use block::*;
pub use builder::*;
pub use element::*;
pub use label::*;
pub use locals_shifter::*;
pub use terminal::*;
pub use transform::*;
