use crate::jvm::Error;
use std::fmt;

/// Opaque label
///
/// Labels are dense handles handed out by the terminal builder of a chain. They mean nothing
/// outside of the method body that created them.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Label(u32);

impl Label {
    /// Index of the label in its method's label table
    pub fn index(&self) -> usize {
        self.0 as usize
    }

    pub(crate) fn from_index(index: usize) -> Label {
        Label(index as u32)
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("l{}", self.0))
    }
}

impl fmt::Display for Label {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, formatter)
    }
}

/// Generates new labels
pub trait LabelGenerator {
    /// Generate a fresh label
    fn fresh_label(&mut self) -> Label;
}

/// Labels of a method body along with where they are bound
///
/// Positions are whatever the owner wants them to be: bytecode offsets for the direct builder,
/// element indices for the buffered one.
#[derive(Clone, Debug, Default)]
pub struct LabelTable {
    bindings: Vec<Option<usize>>,
}

impl LabelTable {
    pub fn new() -> LabelTable {
        LabelTable { bindings: vec![] }
    }

    /// Number of labels generated so far
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Make sure labels below `count` are known to this table
    ///
    /// This is used when a table takes over from another one, so that labels generated there keep
    /// their meaning and fresh labels do not collide with them.
    pub fn reserve_labels(&mut self, count: usize) {
        if count > self.bindings.len() {
            self.bindings.resize(count, None);
        }
    }

    /// Bind a label to a position
    ///
    /// Labels can only be bound once.
    pub fn bind(&mut self, label: Label, position: usize) -> Result<(), Error> {
        self.reserve_labels(label.index() + 1);
        let binding = &mut self.bindings[label.index()];
        if binding.is_some() {
            return Err(Error::LabelAlreadyBound(label));
        }
        *binding = Some(position);
        Ok(())
    }

    /// Position to which a label is bound, if it is bound yet
    pub fn position(&self, label: Label) -> Option<usize> {
        self.bindings.get(label.index()).copied().flatten()
    }

    /// Check if a label is bound
    pub fn is_bound(&self, label: Label) -> bool {
        self.position(label).is_some()
    }
}

impl LabelGenerator for LabelTable {
    fn fresh_label(&mut self) -> Label {
        let label = Label(self.bindings.len() as u32);
        self.bindings.push(None);
        label
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fresh_labels_are_distinct() {
        let mut table = LabelTable::new();
        let l0 = table.fresh_label();
        let l1 = table.fresh_label();
        assert_ne!(l0, l1);
        assert_eq!(table.len(), 2);
        assert_eq!(format!("{:?}", l1), "l1");
    }

    #[test]
    fn labels_bind_once() {
        let mut table = LabelTable::new();
        let label = table.fresh_label();
        assert!(!table.is_bound(label));
        table.bind(label, 12).unwrap();
        assert_eq!(table.position(label), Some(12));
        assert!(matches!(
            table.bind(label, 14),
            Err(Error::LabelAlreadyBound(l)) if l == label
        ));
        assert_eq!(table.position(label), Some(12));
    }

    #[test]
    fn reserved_labels_are_skipped() {
        let mut table = LabelTable::new();
        table.reserve_labels(5);
        assert_eq!(table.fresh_label().index(), 5);
    }
}
