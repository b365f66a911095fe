use super::{
    BlockCodeBuilder, BranchInstruction, BufferedCodeBuilder, ChainedCodeBuilder, CodeElement,
    CodeTransform, Condition, ConstantInstruction, DirectCodeBuilder, ExceptionCatch, Label,
    Operator,
};
use crate::jvm::{BinaryName, Error, TypeKind};

mod private {
    pub trait Sealed {}

    impl Sealed for super::DirectCodeBuilder {}
    impl Sealed for super::BufferedCodeBuilder {}
    impl<'p> Sealed for super::BlockCodeBuilder<'p> {}
    impl<'p> Sealed for super::ChainedCodeBuilder<'p> {}
    impl<'p> Sealed for crate::jvm::code::TransformingCodeBuilder<'p> {}
}

/// Sink for code elements
///
/// Every builder either materializes the elements it receives (the terminals) or forwards them,
/// possibly rewritten, to the next builder in the chain. The set of builders is closed: outside
/// code can only compose the builders in this module, which is what makes the chain walks in
/// [`terminal`] and [`top_local`] exhaustive.
pub trait CodeBuilder: private::Sealed {
    /// Push an element into the builder
    fn with(&mut self, element: CodeElement) -> Result<(), Error>;

    /// Generate a label, unique within the method body being built
    fn fresh_label(&mut self) -> Label;

    /// Claim a local variable slot wide enough for a value of the given kind
    fn allocate_local(&mut self, kind: TypeKind) -> Result<u16, Error>;

    /// Which role the builder plays in the chain
    fn role(&self) -> BuilderRole<'_>;

    /// Mutable counterpart of `role`
    fn role_mut(&mut self) -> BuilderRoleMut<'_>;

    /// Erase the builder type
    fn as_dyn(&mut self) -> &mut dyn CodeBuilder;
}

/// Position of a builder in its chain
pub enum BuilderRole<'a> {
    /// Materializes bytecode as elements arrive
    Direct(&'a DirectCodeBuilder),

    /// Materializes a list of elements
    Buffered(&'a BufferedCodeBuilder),

    /// Scoped region, with its own next free local slot
    Block {
        top_local: u16,
        parent: &'a dyn CodeBuilder,
    },

    /// Output side of one stage of a composed transform
    Transforming { delegate: &'a dyn CodeBuilder },

    /// Input side of a transform applied to everything pushed into it
    Chained { downstream: &'a dyn CodeBuilder },
}

/// Position of a builder in its chain, with mutable access to what comes next
pub enum BuilderRoleMut<'a> {
    Direct(&'a mut DirectCodeBuilder),
    Buffered(&'a mut BufferedCodeBuilder),
    Block(&'a mut dyn CodeBuilder),
    Transforming(&'a mut dyn CodeBuilder),
    Chained(&'a mut dyn CodeBuilder),
}

/// Builder at the end of a chain
pub enum Terminal<'a> {
    Direct(&'a DirectCodeBuilder),
    Buffered(&'a BufferedCodeBuilder),
}

impl<'a> Terminal<'a> {
    /// Next free local slot, as far as the terminal knows
    pub fn cur_top_local(&self) -> u16 {
        match self {
            Terminal::Direct(direct) => direct.cur_top_local(),
            Terminal::Buffered(buffered) => buffered.cur_top_local(),
        }
    }
}

/// Mutable builder at the end of a chain
pub enum TerminalMut<'a> {
    Direct(&'a mut DirectCodeBuilder),
    Buffered(&'a mut BufferedCodeBuilder),
}

impl<'a> TerminalMut<'a> {
    /// Next free local slot, as far as the terminal knows
    pub fn cur_top_local(&self) -> u16 {
        match self {
            TerminalMut::Direct(direct) => direct.cur_top_local(),
            TerminalMut::Buffered(buffered) => buffered.cur_top_local(),
        }
    }

    /// Push an element straight into the terminal, skipping every builder in between
    pub fn with(&mut self, element: CodeElement) -> Result<(), Error> {
        match self {
            TerminalMut::Direct(direct) => direct.with(element),
            TerminalMut::Buffered(buffered) => buffered.with(element),
        }
    }

    /// Allocate a local on the terminal itself
    ///
    /// Doing this while a block is open over the terminal will make closing the block fail.
    pub fn allocate_local(&mut self, kind: TypeKind) -> Result<u16, Error> {
        match self {
            TerminalMut::Direct(direct) => direct.allocate_local(kind),
            TerminalMut::Buffered(buffered) => buffered.allocate_local(kind),
        }
    }
}

/// Find the builder at the end of the chain
pub fn terminal(builder: &dyn CodeBuilder) -> Terminal<'_> {
    match builder.role() {
        BuilderRole::Direct(direct) => Terminal::Direct(direct),
        BuilderRole::Buffered(buffered) => Terminal::Buffered(buffered),
        BuilderRole::Block { parent, .. } => terminal(parent),
        BuilderRole::Transforming { delegate } => terminal(delegate),
        BuilderRole::Chained { downstream } => terminal(downstream),
    }
}

/// Find the builder at the end of the chain
pub fn terminal_mut(builder: &mut dyn CodeBuilder) -> TerminalMut<'_> {
    match builder.role_mut() {
        BuilderRoleMut::Direct(direct) => TerminalMut::Direct(direct),
        BuilderRoleMut::Buffered(buffered) => TerminalMut::Buffered(buffered),
        BuilderRoleMut::Block(next)
        | BuilderRoleMut::Transforming(next)
        | BuilderRoleMut::Chained(next) => terminal_mut(next),
    }
}

/// Next free local slot from the perspective of the given builder
///
/// The closest enclosing block wins, since blocks hand out slots without telling the terminal.
pub fn top_local(builder: &dyn CodeBuilder) -> u16 {
    match builder.role() {
        BuilderRole::Direct(direct) => direct.cur_top_local(),
        BuilderRole::Buffered(buffered) => buffered.cur_top_local(),
        BuilderRole::Block { top_local, .. } => top_local,
        BuilderRole::Transforming { delegate } => top_local(delegate),
        BuilderRole::Chained { downstream } => top_local(downstream),
    }
}

/// Convenience methods for pushing common elements and composing builders
///
/// Elements are pushed with `with`, so they go through whatever transforms are in the chain.
pub trait CodeBuilderExts: CodeBuilder {
    fn load(&mut self, kind: TypeKind, slot: u16) -> Result<&mut Self, Error> {
        self.with(CodeElement::Load(kind, slot))?;
        Ok(self)
    }

    fn store(&mut self, kind: TypeKind, slot: u16) -> Result<&mut Self, Error> {
        self.with(CodeElement::Store(kind, slot))?;
        Ok(self)
    }

    fn increment(&mut self, slot: u16, by: i16) -> Result<&mut Self, Error> {
        self.with(CodeElement::Increment(slot, by))?;
        Ok(self)
    }

    fn constant(&mut self, constant: ConstantInstruction) -> Result<&mut Self, Error> {
        self.with(CodeElement::Constant(constant))?;
        Ok(self)
    }

    fn operator(&mut self, operator: Operator) -> Result<&mut Self, Error> {
        self.with(CodeElement::Operator(operator))?;
        Ok(self)
    }

    /// Conditional jump
    fn branch(&mut self, condition: Condition, target: Label) -> Result<&mut Self, Error> {
        self.with(CodeElement::Branch(condition.branch(target)))?;
        Ok(self)
    }

    fn goto(&mut self, target: Label) -> Result<&mut Self, Error> {
        self.with(CodeElement::Branch(BranchInstruction::Goto(target)))?;
        Ok(self)
    }

    fn label_binding(&mut self, label: Label) -> Result<&mut Self, Error> {
        self.with(CodeElement::LabelTarget(label))?;
        Ok(self)
    }

    /// Generate a label and bind it right here
    fn new_bound_label(&mut self) -> Result<Label, Error> {
        let label = self.fresh_label();
        self.with(CodeElement::LabelTarget(label))?;
        Ok(label)
    }

    fn return_(&mut self, kind: TypeKind) -> Result<&mut Self, Error> {
        self.with(CodeElement::Return(kind))?;
        Ok(self)
    }

    fn throw(&mut self) -> Result<&mut Self, Error> {
        self.with(CodeElement::Throw)?;
        Ok(self)
    }

    fn line_number(&mut self, line: u16) -> Result<&mut Self, Error> {
        self.with(CodeElement::LineNumber(line))?;
        Ok(self)
    }

    fn exception_catch(
        &mut self,
        try_start: Label,
        try_end: Label,
        handler: Label,
        catch_type: Option<BinaryName>,
    ) -> Result<&mut Self, Error> {
        self.with(CodeElement::ExceptionCatch(ExceptionCatch {
            try_start,
            try_end,
            handler,
            catch_type,
        }))?;
        Ok(self)
    }

    /// Run `handler` inside a fresh block, binding the block's break label right after it
    fn block<F>(&mut self, handler: F) -> Result<&mut Self, Error>
    where
        F: FnOnce(&mut BlockCodeBuilder<'_>) -> Result<(), Error>,
    {
        let break_label = self.fresh_label();
        let mut block = BlockCodeBuilder::open(self.as_dyn(), break_label)?;
        handler(&mut block)?;
        block.close()?;
        self.label_binding(break_label)
    }

    /// Run `then_handler` in a block that is skipped unless `condition` holds
    fn if_then<F>(&mut self, condition: Condition, then_handler: F) -> Result<&mut Self, Error>
    where
        F: FnOnce(&mut BlockCodeBuilder<'_>) -> Result<(), Error>,
    {
        let break_label = self.fresh_label();
        let mut then_block = BlockCodeBuilder::open(self.as_dyn(), break_label)?;
        then_block.branch(!condition, break_label)?;
        then_handler(&mut then_block)?;
        then_block.close()?;
        self.label_binding(break_label)
    }

    /// Run either `then_handler` or `else_handler`, depending on `condition`
    fn if_then_else<F, G>(
        &mut self,
        condition: Condition,
        then_handler: F,
        else_handler: G,
    ) -> Result<&mut Self, Error>
    where
        F: FnOnce(&mut BlockCodeBuilder<'_>) -> Result<(), Error>,
        G: FnOnce(&mut BlockCodeBuilder<'_>) -> Result<(), Error>,
    {
        let break_label = self.fresh_label();
        let else_start = self.fresh_label();

        let mut then_block = BlockCodeBuilder::open(self.as_dyn(), break_label)?;
        then_block.branch(!condition, else_start)?;
        then_handler(&mut then_block)?;
        if then_block.reachable() {
            then_block.goto(break_label)?;
        }
        then_block.close()?;

        let mut else_block = BlockCodeBuilder::open_at(self.as_dyn(), else_start, break_label)?;
        else_handler(&mut else_block)?;
        else_block.close()?;

        self.label_binding(break_label)
    }

    /// Hand `handler` a builder which passes everything it receives through `transform`
    fn transforming<T, F>(&mut self, mut transform: T, handler: F) -> Result<&mut Self, Error>
    where
        T: CodeTransform,
        F: FnOnce(&mut ChainedCodeBuilder<'_>) -> Result<(), Error>,
    {
        transform.at_start(self.as_dyn())?;
        {
            let mut chained = ChainedCodeBuilder::new(self.as_dyn(), &mut transform);
            handler(&mut chained)?;
        }
        transform.at_end(self.as_dyn())?;
        Ok(self)
    }

    /// Feed existing elements through `transform` into this builder
    ///
    /// This is how a fragment of foreign code gets injected: parse it into elements, then push
    /// them through a [`super::CodeLocalsShifter`] (possibly composed with other transforms).
    fn transform_elements<I, T>(&mut self, elements: I, mut transform: T) -> Result<&mut Self, Error>
    where
        I: IntoIterator<Item = CodeElement>,
        T: CodeTransform,
    {
        transform.at_start(self.as_dyn())?;
        for element in elements {
            transform.accept(self.as_dyn(), element)?;
        }
        transform.at_end(self.as_dyn())?;
        Ok(self)
    }
}

impl<B: CodeBuilder + ?Sized> CodeBuilderExts for B {}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{AcceptAll, OrdComparison};

    #[test]
    fn walks_reach_the_terminal() {
        let mut direct = DirectCodeBuilder::with_initial_locals(2);
        let break_label = direct.fresh_label();
        let mut outer = BlockCodeBuilder::open(&mut direct, break_label).unwrap();
        let slot = outer.allocate_local(TypeKind::Long).unwrap();
        assert_eq!(slot, 2);

        let inner_break = outer.fresh_label();
        let inner = BlockCodeBuilder::open(&mut outer, inner_break).unwrap();
        assert_eq!(top_local(&inner), 4);
        assert_eq!(terminal(&inner).cur_top_local(), 2);
        assert!(matches!(terminal(&inner), Terminal::Direct(_)));
        inner.close().unwrap();
        outer.close().unwrap();
    }

    #[test]
    fn chained_builder_allocates_downstream() {
        let mut buffered = BufferedCodeBuilder::with_initial_locals(1);
        buffered
            .block(|block| {
                block.transforming(AcceptAll, |chained| {
                    assert_eq!(top_local(&*chained), 1);
                    let slot = chained.allocate_local(TypeKind::Int)?;
                    chained.store(TypeKind::Int, slot)?;
                    assert_eq!(top_local(&*chained), 2);
                    Ok(())
                })?;
                Ok(())
            })
            .unwrap();

        // The block handed out the slot, the terminal never heard of it
        assert_eq!(buffered.cur_top_local(), 1);
    }

    #[test]
    fn if_then_else_skips_goto_after_return() {
        let mut buffered = BufferedCodeBuilder::with_initial_locals(1);
        buffered
            .load(TypeKind::Int, 0)
            .unwrap()
            .if_then_else(
                Condition::If(OrdComparison::EQ),
                |then| {
                    then.constant(ConstantInstruction::Int(1))?
                        .return_(TypeKind::Int)?;
                    Ok(())
                },
                |otherwise| {
                    otherwise.constant(ConstantInstruction::Int(2))?;
                    Ok(())
                },
            )
            .unwrap()
            .return_(TypeKind::Int)
            .unwrap();

        let rendered: Vec<String> = buffered
            .elements()
            .iter()
            .map(|element| element.to_string())
            .collect();
        assert_eq!(
            rendered,
            vec![
                "iload 0",
                "l2:",
                "ifne l1",
                "iconst_1",
                "ireturn",
                "l3:",
                "l1:",
                "iconst_2",
                "l4:",
                "l0:",
                "ireturn",
            ]
        );
        buffered.finish().unwrap();
    }

    #[test]
    fn if_then_else_jumps_over_else() {
        let mut buffered = BufferedCodeBuilder::with_initial_locals(1);
        buffered
            .load(TypeKind::Int, 0)
            .unwrap()
            .if_then_else(
                Condition::If(OrdComparison::LT),
                |then| {
                    then.constant(ConstantInstruction::Int(1))?;
                    Ok(())
                },
                |otherwise| {
                    otherwise.constant(ConstantInstruction::Int(2))?;
                    Ok(())
                },
            )
            .unwrap()
            .return_(TypeKind::Int)
            .unwrap();

        let rendered: Vec<String> = buffered
            .elements()
            .iter()
            .map(|element| element.to_string())
            .collect();
        assert!(rendered.contains(&String::from("ifge l1")));
        assert!(rendered.contains(&String::from("goto l0")));
        buffered.finish().unwrap();
    }
}
