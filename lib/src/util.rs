mod slot_table;

pub use slot_table::*;

/// Elements with a width
///
/// For local variables and value kinds, the width is measured in local variable slots (`long` and
/// `double` take two slots, everything else takes one).
pub trait Width {
    fn width(&self) -> usize;
}
