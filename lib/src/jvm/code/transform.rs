use super::{BuilderRole, BuilderRoleMut, CodeBuilder, CodeElement, Label};
use crate::jvm::{Error, TypeKind};

/// Rewrites a stream of code elements
///
/// For every incoming element, `accept` decides what to emit into the builder it is handed: the
/// element itself, something else, several elements, or nothing at all.
pub trait CodeTransform {
    fn accept(&mut self, builder: &mut dyn CodeBuilder, element: CodeElement) -> Result<(), Error>;

    /// Called before the first element
    fn at_start(&mut self, _builder: &mut dyn CodeBuilder) -> Result<(), Error> {
        Ok(())
    }

    /// Called after the last element
    fn at_end(&mut self, _builder: &mut dyn CodeBuilder) -> Result<(), Error> {
        Ok(())
    }

    /// Compose with another transform, which will receive whatever this one emits
    fn and_then<T: CodeTransform>(self, next: T) -> ChainedTransform<Self, T>
    where
        Self: Sized,
    {
        ChainedTransform {
            first: self,
            second: next,
        }
    }
}

impl<F> CodeTransform for F
where
    F: FnMut(&mut dyn CodeBuilder, CodeElement) -> Result<(), Error>,
{
    fn accept(&mut self, builder: &mut dyn CodeBuilder, element: CodeElement) -> Result<(), Error> {
        self(builder, element)
    }
}

/// Transform which forwards everything unchanged
#[derive(Copy, Clone, Debug, Default)]
pub struct AcceptAll;

impl CodeTransform for AcceptAll {
    fn accept(&mut self, builder: &mut dyn CodeBuilder, element: CodeElement) -> Result<(), Error> {
        builder.with(element)
    }
}

/// Transform which runs `first` and pipes its output through `second`
///
/// Ordering is preserved: everything `first` emits for an element reaches `second` (and then the
/// downstream builder) before the next element is looked at. The hooks nest, so `second` starts
/// before and ends after `first`.
pub struct ChainedTransform<A, B> {
    first: A,
    second: B,
}

impl<A: CodeTransform, B: CodeTransform> CodeTransform for ChainedTransform<A, B> {
    fn accept(&mut self, builder: &mut dyn CodeBuilder, element: CodeElement) -> Result<(), Error> {
        let mut piped = TransformingCodeBuilder::new(builder, &mut self.second);
        self.first.accept(&mut piped, element)
    }

    fn at_start(&mut self, builder: &mut dyn CodeBuilder) -> Result<(), Error> {
        self.second.at_start(builder)?;
        let mut piped = TransformingCodeBuilder::new(builder, &mut self.second);
        self.first.at_start(&mut piped)
    }

    fn at_end(&mut self, builder: &mut dyn CodeBuilder) -> Result<(), Error> {
        {
            let mut piped = TransformingCodeBuilder::new(builder, &mut self.second);
            self.first.at_end(&mut piped)?;
        }
        self.second.at_end(builder)
    }
}

/// Builder handing every element to a transform, which emits into the delegate
///
/// This is what the first stage of a [`ChainedTransform`] writes into.
pub struct TransformingCodeBuilder<'p> {
    delegate: &'p mut dyn CodeBuilder,
    transform: &'p mut dyn CodeTransform,
}

impl<'p> TransformingCodeBuilder<'p> {
    pub fn new(
        delegate: &'p mut dyn CodeBuilder,
        transform: &'p mut dyn CodeTransform,
    ) -> TransformingCodeBuilder<'p> {
        TransformingCodeBuilder {
            delegate,
            transform,
        }
    }
}

impl<'p> CodeBuilder for TransformingCodeBuilder<'p> {
    fn with(&mut self, element: CodeElement) -> Result<(), Error> {
        self.transform.accept(&mut *self.delegate, element)
    }

    fn fresh_label(&mut self) -> Label {
        self.delegate.fresh_label()
    }

    fn allocate_local(&mut self, kind: TypeKind) -> Result<u16, Error> {
        self.delegate.allocate_local(kind)
    }

    fn role(&self) -> BuilderRole<'_> {
        BuilderRole::Transforming {
            delegate: &*self.delegate,
        }
    }

    fn role_mut(&mut self) -> BuilderRoleMut<'_> {
        BuilderRoleMut::Transforming(&mut *self.delegate)
    }

    fn as_dyn(&mut self) -> &mut dyn CodeBuilder {
        self
    }
}

/// Builder running a transform over everything pushed into it
///
/// Handed out by [`super::CodeBuilderExts::transforming`]. The transform's hooks are run by
/// whoever created the builder, not by the builder itself.
pub struct ChainedCodeBuilder<'p> {
    downstream: &'p mut dyn CodeBuilder,
    transform: &'p mut dyn CodeTransform,
}

impl<'p> ChainedCodeBuilder<'p> {
    pub fn new(
        downstream: &'p mut dyn CodeBuilder,
        transform: &'p mut dyn CodeTransform,
    ) -> ChainedCodeBuilder<'p> {
        ChainedCodeBuilder {
            downstream,
            transform,
        }
    }
}

impl<'p> CodeBuilder for ChainedCodeBuilder<'p> {
    fn with(&mut self, element: CodeElement) -> Result<(), Error> {
        self.transform.accept(&mut *self.downstream, element)
    }

    fn fresh_label(&mut self) -> Label {
        self.downstream.fresh_label()
    }

    fn allocate_local(&mut self, kind: TypeKind) -> Result<u16, Error> {
        self.downstream.allocate_local(kind)
    }

    fn role(&self) -> BuilderRole<'_> {
        BuilderRole::Chained {
            downstream: &*self.downstream,
        }
    }

    fn role_mut(&mut self) -> BuilderRoleMut<'_> {
        BuilderRoleMut::Chained(&mut *self.downstream)
    }

    fn as_dyn(&mut self) -> &mut dyn CodeBuilder {
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{BufferedCodeBuilder, CodeBuilderExts, Operator};

    /// Emits a `nop` before every element
    struct Padding;

    impl CodeTransform for Padding {
        fn accept(
            &mut self,
            builder: &mut dyn CodeBuilder,
            element: CodeElement,
        ) -> Result<(), Error> {
            builder.with(CodeElement::Operator(Operator::Nop))?;
            builder.with(element)
        }

        fn at_end(&mut self, builder: &mut dyn CodeBuilder) -> Result<(), Error> {
            builder.with(CodeElement::Return(TypeKind::Void))
        }
    }

    fn rendered(builder: &BufferedCodeBuilder) -> Vec<String> {
        builder
            .elements()
            .iter()
            .map(|element| element.to_string())
            .collect()
    }

    #[test]
    fn closures_are_transforms() {
        let mut builder = BufferedCodeBuilder::with_initial_locals(0);
        let drop_pops = |builder: &mut dyn CodeBuilder, element: CodeElement| match element {
            CodeElement::Operator(Operator::Pop) => Ok(()),
            other => builder.with(other),
        };
        builder
            .transform_elements(
                vec![
                    CodeElement::Operator(Operator::Dup),
                    CodeElement::Operator(Operator::Pop),
                    CodeElement::Operator(Operator::Swap),
                ],
                drop_pops,
            )
            .unwrap();
        assert_eq!(rendered(&builder), vec!["dup", "swap"]);
    }

    #[test]
    fn and_then_feeds_first_into_second() {
        let mut builder = BufferedCodeBuilder::with_initial_locals(0);
        let duplicate = |builder: &mut dyn CodeBuilder, element: CodeElement| {
            builder.with(element.clone())?;
            builder.with(element)
        };
        builder
            .transform_elements(
                vec![CodeElement::Operator(Operator::Dup)],
                duplicate.and_then(Padding),
            )
            .unwrap();
        assert_eq!(rendered(&builder), vec!["nop", "dup", "nop", "dup", "return"]);
    }

    #[test]
    fn transforming_runs_hooks() {
        let mut builder = BufferedCodeBuilder::with_initial_locals(0);
        builder
            .transforming(Padding, |chained| {
                chained.operator(Operator::Pop)?.operator(Operator::Pop2)?;
                Ok(())
            })
            .unwrap()
            .operator(Operator::Nop)
            .unwrap();
        assert_eq!(
            rendered(&builder),
            vec!["nop", "pop", "nop", "pop2", "return", "nop"]
        );
    }
}
