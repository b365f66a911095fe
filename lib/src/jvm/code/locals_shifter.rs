use super::{CodeBuilder, CodeElement, CodeTransform};
use crate::jvm::{Error, MethodAccessFlags, MethodDescriptor, TypeKind};
use crate::util::SlotTable;
use std::convert::TryFrom;

/// Transform moving the locals of a code fragment into fresh slots of the host method
///
/// The fragment and the host are assumed to agree on the receiver and parameters, so slots below
/// the fixed count are left alone. Every other slot gets a fresh slot from the downstream builder
/// the first time it is seen, and keeps it for the rest of the fragment.
///
/// Slots are keyed on both their number and width: `(s, int)` and `(s, long)` are distinct
/// locals. The key for slot `s` is `2s - fixed` when narrow and `2s - fixed + 1` when wide, so a
/// wide slot's key sits right after the key of the narrow slot at the same number. When a wide
/// slot is allocated, that narrow key is pointed at the same fresh slot unless the narrow slot
/// already had its own.
#[derive(Clone, Debug)]
pub struct CodeLocalsShifter {
    locals: SlotTable,
    fixed: u16,
}

impl CodeLocalsShifter {
    /// Shifter for fragments injected into a method with the given flags and descriptor
    pub fn of(
        flags: MethodAccessFlags,
        descriptor: &MethodDescriptor,
    ) -> Result<CodeLocalsShifter, Error> {
        let fixed = u16::try_from(descriptor.parameter_length(flags.has_receiver()))
            .map_err(|_| Error::LocalsOverflow)?;
        Ok(CodeLocalsShifter::with_fixed_locals(fixed))
    }

    /// Shifter leaving the first `fixed` slots alone
    pub fn with_fixed_locals(fixed: u16) -> CodeLocalsShifter {
        CodeLocalsShifter {
            locals: SlotTable::new(),
            fixed,
        }
    }

    pub fn fixed_locals(&self) -> u16 {
        self.fixed
    }

    /// Map a fragment slot to a host slot, allocating from `builder` if needed
    pub fn shift(
        &mut self,
        builder: &mut dyn CodeBuilder,
        slot: u16,
        kind: TypeKind,
    ) -> Result<u16, Error> {
        if kind == TypeKind::Void {
            return Err(Error::VoidLocal);
        }
        if slot < self.fixed {
            return Ok(slot);
        }

        let size = kind.slot_size() as usize;
        let key = 2 * slot as usize - self.fixed as usize + size - 1;
        if let Some(shifted) = self.locals.get(key) {
            return Ok(shifted);
        }

        let shifted = builder.allocate_local(kind)?;
        self.locals.insert(key, shifted);
        if size == 2 && !self.locals.contains(key - 1) {
            self.locals.insert(key - 1, shifted);
        }
        log::trace!("Shifted local {} ({}) to {}", slot, kind, shifted);
        Ok(shifted)
    }
}

impl CodeTransform for CodeLocalsShifter {
    fn accept(&mut self, builder: &mut dyn CodeBuilder, element: CodeElement) -> Result<(), Error> {
        let element = match element.local_slot() {
            Some((slot, kind)) => {
                let shifted = self.shift(builder, slot, kind)?;
                element.with_local_slot(shifted)
            }
            None => element,
        };
        builder.with(element)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{BufferedCodeBuilder, CodeBuilderExts, LocalVariableType};
    use crate::jvm::{ParseDescriptor, UnqualifiedName};

    #[test]
    fn fixed_locals_from_descriptor() {
        let descriptor = MethodDescriptor::parse("(DI)V").unwrap();
        let instance = CodeLocalsShifter::of(MethodAccessFlags::PUBLIC, &descriptor).unwrap();
        assert_eq!(instance.fixed_locals(), 4);
        let stat = CodeLocalsShifter::of(MethodAccessFlags::STATIC, &descriptor).unwrap();
        assert_eq!(stat.fixed_locals(), 3);
    }

    #[test]
    fn fixed_slots_pass_through() {
        let mut builder = BufferedCodeBuilder::with_initial_locals(5);
        let mut shifter = CodeLocalsShifter::with_fixed_locals(2);
        assert_eq!(shifter.shift(&mut builder, 0, TypeKind::Reference).unwrap(), 0);
        assert_eq!(shifter.shift(&mut builder, 1, TypeKind::Long).unwrap(), 1);
        assert_eq!(builder.cur_top_local(), 5);
    }

    #[test]
    fn void_is_rejected_before_anything_else() {
        let mut builder = BufferedCodeBuilder::with_initial_locals(5);
        let mut shifter = CodeLocalsShifter::with_fixed_locals(2);
        assert!(matches!(
            shifter.shift(&mut builder, 0, TypeKind::Void),
            Err(Error::VoidLocal)
        ));
        assert!(matches!(
            shifter.shift(&mut builder, 9, TypeKind::Void),
            Err(Error::VoidLocal)
        ));
    }

    #[test]
    fn widths_get_distinct_slots() {
        let mut builder = BufferedCodeBuilder::with_initial_locals(1);
        let mut shifter = CodeLocalsShifter::with_fixed_locals(1);
        let narrow = shifter.shift(&mut builder, 3, TypeKind::Int).unwrap();
        let wide = shifter.shift(&mut builder, 3, TypeKind::Long).unwrap();
        assert_eq!((narrow, wide), (1, 2));

        // The narrow slot keeps its own allocation
        assert_eq!(shifter.shift(&mut builder, 3, TypeKind::Int).unwrap(), 1);
        assert_eq!(shifter.shift(&mut builder, 3, TypeKind::Double).unwrap(), 2);
        assert_eq!(builder.cur_top_local(), 4);
    }

    #[test]
    fn wide_slots_back_fill_their_low_half() {
        let mut builder = BufferedCodeBuilder::with_initial_locals(1);
        let mut shifter = CodeLocalsShifter::with_fixed_locals(1);
        let wide = shifter.shift(&mut builder, 2, TypeKind::Double).unwrap();
        let narrow = shifter.shift(&mut builder, 2, TypeKind::Float).unwrap();
        assert_eq!(wide, 1);
        assert_eq!(narrow, 1);
        assert_eq!(builder.cur_top_local(), 3);
    }

    #[test]
    fn sparse_slots_allocate_in_first_use_order() {
        let mut builder = BufferedCodeBuilder::with_initial_locals(0);
        let mut shifter = CodeLocalsShifter::with_fixed_locals(0);
        assert_eq!(shifter.shift(&mut builder, 900, TypeKind::Int).unwrap(), 0);
        assert_eq!(shifter.shift(&mut builder, 7, TypeKind::Reference).unwrap(), 1);
        assert_eq!(shifter.shift(&mut builder, 900, TypeKind::Int).unwrap(), 0);
    }

    #[test]
    fn debug_entries_are_shifted() {
        let mut builder = BufferedCodeBuilder::with_initial_locals(4);
        let start = builder.fresh_label();
        let end = builder.fresh_label();
        let fragment = vec![
            CodeElement::LabelTarget(start),
            CodeElement::Store(TypeKind::Reference, 1),
            CodeElement::LabelTarget(end),
            CodeElement::LocalVariableType(LocalVariableType {
                slot: 1,
                name: UnqualifiedName::number(1),
                signature: String::from("Ljava/util/List<Ljava/lang/String;>;"),
                start,
                end,
            }),
        ];
        builder
            .transform_elements(fragment, CodeLocalsShifter::with_fixed_locals(1))
            .unwrap();
        assert_eq!(builder.elements()[1], CodeElement::Store(TypeKind::Reference, 4));
        assert!(matches!(
            &builder.elements()[3],
            CodeElement::LocalVariableType(local) if local.slot == 4
        ));
    }
}
