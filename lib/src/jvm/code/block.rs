use super::{
    terminal, terminal_mut, top_local, BranchKind, BuilderRole, BuilderRoleMut, CodeBuilder,
    CodeElement, Label,
};
use crate::jvm::{Error, TypeKind};

/// Builder for an explicitly scoped region of code
///
/// A block is delimited by a start and an end label (both fresh, and placed directly on the
/// terminal) and has a break label supplied by whoever opened it. Locals allocated inside the
/// block come from the block's own counter, which starts at the next free slot of the enclosing
/// builder. The terminal is not told about them, so sibling blocks end up reusing the same slots.
///
/// Reachability is tracked approximately: an unconditional branch makes the rest of the block
/// unreachable until a label shows up, even if nothing jumps to that label.
pub struct BlockCodeBuilder<'p> {
    parent: &'p mut dyn CodeBuilder,
    start_label: Label,
    end_label: Label,
    break_label: Label,
    reachable: bool,
    has_instructions: bool,

    /// Next free slot for allocations inside the block
    top_local: u16,

    /// Next free slot of the terminal when the block was opened
    terminal_max_locals: u16,
}

/// Facts about a block, as of when it was closed
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlockSummary {
    pub start: Label,
    pub end: Label,
    pub break_label: Label,

    /// Could control fall off the end of the block?
    pub reachable: bool,

    /// Did the block contain no instructions (only pseudo-elements)?
    pub empty: bool,
}

impl<'p> BlockCodeBuilder<'p> {
    /// Open a block on top of `parent`
    pub fn open(
        parent: &'p mut dyn CodeBuilder,
        break_label: Label,
    ) -> Result<BlockCodeBuilder<'p>, Error> {
        let start_label = parent.fresh_label();
        BlockCodeBuilder::open_at(parent, start_label, break_label)
    }

    /// Open a block starting at a label that was generated ahead of time
    pub(crate) fn open_at(
        parent: &'p mut dyn CodeBuilder,
        start_label: Label,
        break_label: Label,
    ) -> Result<BlockCodeBuilder<'p>, Error> {
        let end_label = parent.fresh_label();
        let top_local = top_local(&*parent);
        let terminal_max_locals = terminal(&*parent).cur_top_local();
        terminal_mut(&mut *parent).with(CodeElement::LabelTarget(start_label))?;
        log::debug!(
            "Opened block {}..{} (break {}) with top local {}",
            start_label,
            end_label,
            break_label,
            top_local
        );

        Ok(BlockCodeBuilder {
            parent,
            start_label,
            end_label,
            break_label,
            reachable: true,
            has_instructions: false,
            top_local,
            terminal_max_locals,
        })
    }

    /// Close the block, checking that nobody allocated locals on the terminal meanwhile
    pub fn close(self) -> Result<BlockSummary, Error> {
        let BlockCodeBuilder {
            parent,
            start_label,
            end_label,
            break_label,
            reachable,
            has_instructions,
            terminal_max_locals,
            ..
        } = self;

        let mut terminal = terminal_mut(parent);
        terminal.with(CodeElement::LabelTarget(end_label))?;

        let found = terminal.cur_top_local();
        if found != terminal_max_locals {
            log::error!(
                "Block {}..{} saw the terminal top local move from {} to {}",
                start_label,
                end_label,
                terminal_max_locals,
                found
            );
            return Err(Error::LocalSlotInterference {
                expected: terminal_max_locals,
                found,
            });
        }
        log::debug!("Closed block {}..{}", start_label, end_label);

        Ok(BlockSummary {
            start: start_label,
            end: end_label,
            break_label,
            reachable,
            empty: !has_instructions,
        })
    }

    pub fn start_label(&self) -> Label {
        self.start_label
    }

    pub fn end_label(&self) -> Label {
        self.end_label
    }

    /// Label that jumps out of the block (bound by whoever opened the block)
    pub fn break_label(&self) -> Label {
        self.break_label
    }

    /// Can control reach the current point in the block?
    pub fn reachable(&self) -> bool {
        self.reachable
    }

    /// Have no instructions been pushed into the block yet?
    pub fn is_empty(&self) -> bool {
        !self.has_instructions
    }
}

impl<'p> CodeBuilder for BlockCodeBuilder<'p> {
    fn with(&mut self, element: CodeElement) -> Result<(), Error> {
        let is_instruction = !element.is_pseudo();
        let is_label_target = matches!(element, CodeElement::LabelTarget(_));
        let branch_kind = element.branch_kind();

        self.parent.with(element)?;

        self.has_instructions |= is_instruction;
        if self.reachable {
            if branch_kind == BranchKind::Unconditional {
                self.reachable = false;
            }
        } else if is_label_target {
            self.reachable = true;
        }
        Ok(())
    }

    fn fresh_label(&mut self) -> Label {
        self.parent.fresh_label()
    }

    fn allocate_local(&mut self, kind: TypeKind) -> Result<u16, Error> {
        if kind == TypeKind::Void {
            return Err(Error::VoidLocal);
        }
        let slot = self.top_local;
        self.top_local = slot
            .checked_add(kind.slot_size())
            .ok_or(Error::LocalsOverflow)?;
        Ok(slot)
    }

    fn role(&self) -> BuilderRole<'_> {
        BuilderRole::Block {
            top_local: self.top_local,
            parent: &*self.parent,
        }
    }

    fn role_mut(&mut self) -> BuilderRoleMut<'_> {
        BuilderRoleMut::Block(&mut *self.parent)
    }

    fn as_dyn(&mut self) -> &mut dyn CodeBuilder {
        self
    }
}
