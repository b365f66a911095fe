use classweave::jvm::code::*;
use classweave::jvm::*;

fn instance_void() -> (MethodAccessFlags, MethodDescriptor) {
    (
        MethodAccessFlags::PUBLIC,
        MethodDescriptor::parse("()V").unwrap(),
    )
}

/// Fragment using an `int` in slot 1 and a `long` in slots 2-3
fn int_then_long() -> Vec<CodeElement> {
    vec![
        CodeElement::Store(TypeKind::Int, 1),
        CodeElement::Load(TypeKind::Int, 1),
        CodeElement::Store(TypeKind::Long, 2),
        CodeElement::Load(TypeKind::Long, 2),
    ]
}

#[test]
fn fragment_locals_move_past_host_locals() {
    let (flags, descriptor) = instance_void();
    let mut code = BufferedCodeBuilder::new(flags, &descriptor).unwrap();
    assert_eq!(code.allocate_local(TypeKind::Reference).unwrap(), 1);

    let shifter = CodeLocalsShifter::of(flags, &descriptor).unwrap();
    assert_eq!(shifter.fixed_locals(), 1);
    code.transform_elements(int_then_long(), shifter).unwrap();

    assert_eq!(
        code.elements(),
        &[
            CodeElement::Store(TypeKind::Int, 2),
            CodeElement::Load(TypeKind::Int, 2),
            CodeElement::Store(TypeKind::Long, 3),
            CodeElement::Load(TypeKind::Long, 3),
        ]
    );
    assert_eq!(code.cur_top_local(), 5);
}

#[test]
fn fragment_encodes_with_fresh_slots() {
    let (flags, descriptor) = instance_void();
    let mut code = DirectCodeBuilder::new(flags, &descriptor).unwrap();
    code.transform_elements(
        int_then_long(),
        CodeLocalsShifter::of(flags, &descriptor).unwrap(),
    )
    .unwrap()
    .return_(TypeKind::Void)
    .unwrap();

    let body = code.finish().unwrap();
    assert_eq!(body.code, vec![0x3c, 0x1b, 0x41, 0x20, 0xb1]);
    assert_eq!(body.max_locals, 4);
}

#[test]
fn fragment_inside_block_does_not_touch_terminal() {
    let (flags, descriptor) = instance_void();
    let mut code = DirectCodeBuilder::new(flags, &descriptor).unwrap();
    let break_label = code.fresh_label();

    let mut block = BlockCodeBuilder::open(&mut code, break_label).unwrap();
    block
        .transform_elements(
            int_then_long(),
            CodeLocalsShifter::of(flags, &descriptor).unwrap(),
        )
        .unwrap();
    assert_eq!(top_local(&block), 4);
    let summary = block.close().unwrap();
    assert!(!summary.empty);
    assert!(summary.reachable);

    code.label_binding(break_label)
        .unwrap()
        .return_(TypeKind::Void)
        .unwrap();
    assert_eq!(code.cur_top_local(), 1);

    // Slots referenced inside the block still count towards the method's locals
    let body = code.finish().unwrap();
    assert_eq!(body.max_locals, 4);
}

#[test]
fn sibling_blocks_reuse_slots() {
    let mut code = BufferedCodeBuilder::with_initial_locals(2);
    let mut slots = vec![];
    for _ in 0..2 {
        code.block(|block| {
            let slot = block.allocate_local(TypeKind::Double)?;
            block.constant(ConstantInstruction::Double1)?.store(TypeKind::Double, slot)?;
            slots.push(slot);
            Ok(())
        })
        .unwrap();
    }
    assert_eq!(slots, vec![2, 2]);
    assert_eq!(code.cur_top_local(), 2);
}

#[test]
fn block_with_only_goto() {
    let mut code = DirectCodeBuilder::with_initial_locals(0);
    let break_label = code.fresh_label();
    let mut block = BlockCodeBuilder::open(&mut code, break_label).unwrap();
    block.goto(break_label).unwrap();
    let summary = block.close().unwrap();
    assert!(!summary.empty);
    assert!(!summary.reachable);
}

#[test]
fn empty_block() {
    let mut code = DirectCodeBuilder::with_initial_locals(0);
    let break_label = code.fresh_label();
    let summary = BlockCodeBuilder::open(&mut code, break_label)
        .unwrap()
        .close()
        .unwrap();
    assert!(summary.empty);
    assert!(summary.reachable);
}

#[test]
fn terminal_allocation_during_block_fails_close() {
    let mut code = BufferedCodeBuilder::with_initial_locals(3);
    let break_label = code.fresh_label();
    let mut block = BlockCodeBuilder::open(&mut code, break_label).unwrap();
    block.allocate_local(TypeKind::Int).unwrap();
    terminal_mut(&mut block)
        .allocate_local(TypeKind::Long)
        .unwrap();
    match block.close() {
        Err(Error::LocalSlotInterference { expected, found }) => {
            assert_eq!((expected, found), (3, 5));
        }
        other => panic!("expected interference, got {:?}", other),
    }
}

#[test]
fn shifter_leaves_parameters_alone() {
    let descriptor = MethodDescriptor::parse("(JLjava/lang/Object;)I").unwrap();
    let flags = MethodAccessFlags::STATIC;
    let mut code = BufferedCodeBuilder::new(flags, &descriptor).unwrap();
    let fragment = vec![
        CodeElement::Load(TypeKind::Long, 0),
        CodeElement::Load(TypeKind::Reference, 2),
        CodeElement::Operator(Operator::Pop),
        CodeElement::Operator(Operator::L2I),
        CodeElement::Return(TypeKind::Int),
    ];
    code.transform_elements(
        fragment.clone(),
        CodeLocalsShifter::of(flags, &descriptor).unwrap(),
    )
    .unwrap();
    assert_eq!(code.elements(), fragment.as_slice());
    assert_eq!(code.cur_top_local(), 3);
}

#[test]
fn void_slot_is_rejected() {
    let mut code = BufferedCodeBuilder::with_initial_locals(0);
    let result = code.transform_elements(
        vec![CodeElement::Load(TypeKind::Void, 7)],
        CodeLocalsShifter::with_fixed_locals(0),
    );
    assert!(matches!(result, Err(Error::VoidLocal)));
}

#[test]
fn shifter_composes_with_other_transforms() {
    let mut code = BufferedCodeBuilder::with_initial_locals(1);
    let strip_lines = |builder: &mut dyn CodeBuilder, element: CodeElement| match element {
        CodeElement::LineNumber(_) => Ok(()),
        other => builder.with(other),
    };
    let fragment = vec![
        CodeElement::LineNumber(4),
        CodeElement::Increment(1, 2),
        CodeElement::LineNumber(5),
        CodeElement::Load(TypeKind::Int, 1),
    ];
    code.transform_elements(
        fragment,
        strip_lines.and_then(CodeLocalsShifter::with_fixed_locals(1)),
    )
    .unwrap();
    assert_eq!(
        code.elements(),
        &[
            CodeElement::Increment(1, 2),
            CodeElement::Load(TypeKind::Int, 1),
        ]
    );
}

#[test]
fn nested_shifters_inject_twice() {
    // The same fragment injected twice gets two separate sets of locals
    let (flags, descriptor) = instance_void();
    let mut code = BufferedCodeBuilder::new(flags, &descriptor).unwrap();
    for _ in 0..2 {
        code.transform_elements(
            int_then_long(),
            CodeLocalsShifter::of(flags, &descriptor).unwrap(),
        )
        .unwrap();
    }
    let stores: Vec<u16> = code
        .elements()
        .iter()
        .filter_map(|element| match element {
            CodeElement::Store(_, slot) => Some(*slot),
            _ => None,
        })
        .collect();
    assert_eq!(stores, vec![1, 2, 4, 5]);
    assert_eq!(code.finish().unwrap().max_locals, 7);
}
