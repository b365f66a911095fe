//! The elements flowing through a chain of code builders
//!
//! We split the JVM instructions a bit differently from the raw opcode list, so that each variant
//! carries exactly the operands a transform might want to look at or rewrite:
//!
//!   - loads, stores, and `iinc` expose their local variable slot (and the kind of value there)
//!   - branches expose their target labels
//!   - instructions without any interesting operands are lumped together as [`Operator`]s
//!
//! Alongside the instructions are pseudo-elements: they occupy no space in the bytecode array but
//! carry structural information (label positions, debug tables, exception handlers).

use super::Label;
use crate::jvm::{BinaryName, FieldType, RenderDescriptor, TypeKind, UnqualifiedName};
use std::fmt;
use std::ops::Not;

/// Single element of a method body
#[derive(Clone, Debug, PartialEq)]
pub enum CodeElement {
    Load(TypeKind, u16),  // covers `xload`, `xload_<n>`, and `wide xload`
    Store(TypeKind, u16), // covers `xstore`, `xstore_<n>`, and `wide xstore`
    Increment(u16, i16),  // covers `iinc` and `wide iinc`
    Constant(ConstantInstruction),
    Operator(Operator),
    Branch(BranchInstruction),
    Return(TypeKind), // `TypeKind::Void` for plain `return`
    Throw,

    /// Position of a label (pseudo)
    LabelTarget(Label),

    /// Source line number of the following instructions (pseudo)
    LineNumber(u16),

    /// Exception handler covering a range of code (pseudo)
    ExceptionCatch(ExceptionCatch),

    /// Debug information about a local variable (pseudo)
    LocalVariable(LocalVariable),

    /// Debug information about a local variable with a generic type (pseudo)
    LocalVariableType(LocalVariableType),
}

/// How an element affects control flow
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BranchKind {
    /// Control always falls through to the next element
    None,

    /// Control may jump or fall through
    Conditional,

    /// Control never falls through
    Unconditional,
}

impl CodeElement {
    /// Does this element not correspond to any bytes in the code array?
    pub fn is_pseudo(&self) -> bool {
        matches!(
            self,
            CodeElement::LabelTarget(_)
                | CodeElement::LineNumber(_)
                | CodeElement::ExceptionCatch(_)
                | CodeElement::LocalVariable(_)
                | CodeElement::LocalVariableType(_)
        )
    }

    pub fn branch_kind(&self) -> BranchKind {
        match self {
            CodeElement::Branch(branch) => branch.branch_kind(),
            CodeElement::Return(_) | CodeElement::Throw => BranchKind::Unconditional,
            _ => BranchKind::None,
        }
    }

    /// Every label this element mentions
    pub fn referenced_labels(&self) -> Vec<Label> {
        match self {
            CodeElement::Branch(branch) => branch.targets(),
            CodeElement::LabelTarget(label) => vec![*label],
            CodeElement::ExceptionCatch(catch) => {
                vec![catch.try_start, catch.try_end, catch.handler]
            }
            CodeElement::LocalVariable(local) => vec![local.start, local.end],
            CodeElement::LocalVariableType(local) => vec![local.start, local.end],
            _ => vec![],
        }
    }

    /// Local variable slot used by this element, along with the kind of value in it
    pub fn local_slot(&self) -> Option<(u16, TypeKind)> {
        match self {
            CodeElement::Load(kind, slot) | CodeElement::Store(kind, slot) => Some((*slot, *kind)),
            CodeElement::Increment(slot, _) => Some((*slot, TypeKind::Int)),
            CodeElement::LocalVariable(local) => {
                Some((local.slot, TypeKind::from(&local.descriptor)))
            }
            CodeElement::LocalVariableType(local) => {
                Some((local.slot, TypeKind::from_signature(&local.signature)))
            }
            _ => None,
        }
    }

    /// Same element, but using a different local variable slot
    ///
    /// Elements without a slot (see [`CodeElement::local_slot`]) are returned unchanged.
    pub fn with_local_slot(self, slot: u16) -> CodeElement {
        match self {
            CodeElement::Load(kind, _) => CodeElement::Load(kind, slot),
            CodeElement::Store(kind, _) => CodeElement::Store(kind, slot),
            CodeElement::Increment(_, by) => CodeElement::Increment(slot, by),
            CodeElement::LocalVariable(local) => {
                CodeElement::LocalVariable(LocalVariable { slot, ..local })
            }
            CodeElement::LocalVariableType(local) => {
                CodeElement::LocalVariableType(LocalVariableType { slot, ..local })
            }
            other => other,
        }
    }
}

/// Instructions pushing a constant without touching the constant pool
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ConstantInstruction {
    Null,
    Int(i16), // `iconst_<i>`, `bipush`, or `sipush`, whichever is shortest
    Long0,
    Long1,
    Float0,
    Float1,
    Float2,
    Double0,
    Double1,
}

macro_rules! operators {
    ($($variant:ident => ($opcode:literal, $mnemonic:literal),)*) => {
        /// Instructions with no operands
        #[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
        pub enum Operator {
            $($variant,)*
        }

        impl Operator {
            pub const ALL: &'static [Operator] = &[$(Operator::$variant,)*];

            pub const fn opcode(&self) -> u8 {
                match self {
                    $(Operator::$variant => $opcode,)*
                }
            }

            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $(Operator::$variant => $mnemonic,)*
                }
            }
        }
    };
}

operators! {
    Nop => (0x00, "nop"),
    IALoad => (0x2e, "iaload"),
    LALoad => (0x2f, "laload"),
    FALoad => (0x30, "faload"),
    DALoad => (0x31, "daload"),
    AALoad => (0x32, "aaload"),
    BALoad => (0x33, "baload"),
    CALoad => (0x34, "caload"),
    SALoad => (0x35, "saload"),
    IAStore => (0x4f, "iastore"),
    LAStore => (0x50, "lastore"),
    FAStore => (0x51, "fastore"),
    DAStore => (0x52, "dastore"),
    AAStore => (0x53, "aastore"),
    BAStore => (0x54, "bastore"),
    CAStore => (0x55, "castore"),
    SAStore => (0x56, "sastore"),
    Pop => (0x57, "pop"),
    Pop2 => (0x58, "pop2"),
    Dup => (0x59, "dup"),
    DupX1 => (0x5a, "dup_x1"),
    DupX2 => (0x5b, "dup_x2"),
    Dup2 => (0x5c, "dup2"),
    Dup2X1 => (0x5d, "dup2_x1"),
    Dup2X2 => (0x5e, "dup2_x2"),
    Swap => (0x5f, "swap"),
    IAdd => (0x60, "iadd"),
    LAdd => (0x61, "ladd"),
    FAdd => (0x62, "fadd"),
    DAdd => (0x63, "dadd"),
    ISub => (0x64, "isub"),
    LSub => (0x65, "lsub"),
    FSub => (0x66, "fsub"),
    DSub => (0x67, "dsub"),
    IMul => (0x68, "imul"),
    LMul => (0x69, "lmul"),
    FMul => (0x6a, "fmul"),
    DMul => (0x6b, "dmul"),
    IDiv => (0x6c, "idiv"),
    LDiv => (0x6d, "ldiv"),
    FDiv => (0x6e, "fdiv"),
    DDiv => (0x6f, "ddiv"),
    IRem => (0x70, "irem"),
    LRem => (0x71, "lrem"),
    FRem => (0x72, "frem"),
    DRem => (0x73, "drem"),
    INeg => (0x74, "ineg"),
    LNeg => (0x75, "lneg"),
    FNeg => (0x76, "fneg"),
    DNeg => (0x77, "dneg"),
    IShl => (0x78, "ishl"),
    LShl => (0x79, "lshl"),
    IShr => (0x7a, "ishr"),
    LShr => (0x7b, "lshr"),
    IUShr => (0x7c, "iushr"),
    LUShr => (0x7d, "lushr"),
    IAnd => (0x7e, "iand"),
    LAnd => (0x7f, "land"),
    IOr => (0x80, "ior"),
    LOr => (0x81, "lor"),
    IXor => (0x82, "ixor"),
    LXor => (0x83, "lxor"),
    I2L => (0x85, "i2l"),
    I2F => (0x86, "i2f"),
    I2D => (0x87, "i2d"),
    L2I => (0x88, "l2i"),
    L2F => (0x89, "l2f"),
    L2D => (0x8a, "l2d"),
    F2I => (0x8b, "f2i"),
    F2L => (0x8c, "f2l"),
    F2D => (0x8d, "f2d"),
    D2I => (0x8e, "d2i"),
    D2L => (0x8f, "d2l"),
    D2F => (0x90, "d2f"),
    I2B => (0x91, "i2b"),
    I2C => (0x92, "i2c"),
    I2S => (0x93, "i2s"),
    LCmp => (0x94, "lcmp"),
    FCmpL => (0x95, "fcmpl"),
    FCmpG => (0x96, "fcmpg"),
    DCmpL => (0x97, "dcmpl"),
    DCmpG => (0x98, "dcmpg"),
    ArrayLength => (0xbe, "arraylength"),
    MonitorEnter => (0xc2, "monitorenter"),
    MonitorExit => (0xc3, "monitorexit"),
}

impl Operator {
    /// Look up an operator by its mnemonic
    pub fn from_mnemonic(mnemonic: &str) -> Option<Operator> {
        Operator::ALL
            .iter()
            .find(|operator| operator.mnemonic() == mnemonic)
            .copied()
    }
}

/// Branch instructions, with their jump targets
///
/// Returns and `athrow` also end a basic block, but since they don't have targets they are kept
/// as their own elements.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum BranchInstruction {
    If(OrdComparison, Label), // covers `ifeq`, `ifne`, `iflt`, `ifge`, `ifgt`, `ifle`
    IfICmp(OrdComparison, Label), // covers `if_icmpeq`, `if_icmpne`, ... `if_icmple`
    IfACmp(EqComparison, Label), // covers `if_acmpeq`, `if_acmpne`
    IfNull(EqComparison, Label), // covers `ifnull`, `ifnonnull`
    Goto(Label),
    TableSwitch {
        /// Jump target if the argument is less than `low` or greater than
        /// `low + targets.len() - 1`
        default: Label,

        /// Value associated with the first jump target
        low: i32,

        /// Jump targets
        targets: Vec<Label>,
    },
    LookupSwitch {
        /// Jump target if there is no corresponding key
        default: Label,

        /// Jump targets (need not be sorted, they are sorted when written out)
        targets: Vec<(i32, Label)>,
    },
}

impl BranchInstruction {
    pub fn branch_kind(&self) -> BranchKind {
        match self {
            BranchInstruction::If(_, _)
            | BranchInstruction::IfICmp(_, _)
            | BranchInstruction::IfACmp(_, _)
            | BranchInstruction::IfNull(_, _) => BranchKind::Conditional,
            BranchInstruction::Goto(_)
            | BranchInstruction::TableSwitch { .. }
            | BranchInstruction::LookupSwitch { .. } => BranchKind::Unconditional,
        }
    }

    /// Every label this instruction might jump to
    pub fn targets(&self) -> Vec<Label> {
        match self {
            BranchInstruction::If(_, lbl)
            | BranchInstruction::IfICmp(_, lbl)
            | BranchInstruction::IfACmp(_, lbl)
            | BranchInstruction::IfNull(_, lbl)
            | BranchInstruction::Goto(lbl) => vec![*lbl],
            BranchInstruction::TableSwitch {
                default, targets, ..
            } => {
                let mut ts = vec![*default];
                ts.extend(targets.iter().copied());
                ts
            }
            BranchInstruction::LookupSwitch { default, targets } => {
                let mut ts = vec![*default];
                ts.extend(targets.iter().map(|(_, target)| *target));
                ts
            }
        }
    }
}

/// Condition under which a conditional branch jumps
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum Condition {
    /// Compare the `int` on top of the stack against zero
    If(OrdComparison),

    /// Compare the two `int`s on top of the stack
    IfICmp(OrdComparison),

    /// Compare the two references on top of the stack
    IfACmp(EqComparison),

    /// Compare the reference on top of the stack against `null`
    IfNull(EqComparison),
}

impl Condition {
    /// Branch to `target` under this condition
    pub fn branch(self, target: Label) -> BranchInstruction {
        match self {
            Condition::If(op) => BranchInstruction::If(op, target),
            Condition::IfICmp(op) => BranchInstruction::IfICmp(op, target),
            Condition::IfACmp(op) => BranchInstruction::IfACmp(op, target),
            Condition::IfNull(op) => BranchInstruction::IfNull(op, target),
        }
    }
}

impl Not for Condition {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            Condition::If(op) => Condition::If(!op),
            Condition::IfICmp(op) => Condition::IfICmp(!op),
            Condition::IfACmp(op) => Condition::IfACmp(!op),
            Condition::IfNull(op) => Condition::IfNull(!op),
        }
    }
}

/// Binary comparison operators available for `int` branches
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum OrdComparison {
    EQ,
    GE,
    GT,
    LE,
    LT,
    NE,
}

impl OrdComparison {
    pub const fn suffix(&self) -> &'static str {
        match self {
            OrdComparison::EQ => "eq",
            OrdComparison::GE => "ge",
            OrdComparison::GT => "gt",
            OrdComparison::LE => "le",
            OrdComparison::LT => "lt",
            OrdComparison::NE => "ne",
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<OrdComparison> {
        match suffix {
            "eq" => Some(OrdComparison::EQ),
            "ge" => Some(OrdComparison::GE),
            "gt" => Some(OrdComparison::GT),
            "le" => Some(OrdComparison::LE),
            "lt" => Some(OrdComparison::LT),
            "ne" => Some(OrdComparison::NE),
            _ => None,
        }
    }
}

impl Not for OrdComparison {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            OrdComparison::EQ => OrdComparison::NE,
            OrdComparison::GE => OrdComparison::LT,
            OrdComparison::GT => OrdComparison::LE,
            OrdComparison::LE => OrdComparison::GT,
            OrdComparison::LT => OrdComparison::GE,
            OrdComparison::NE => OrdComparison::EQ,
        }
    }
}

/// Equality/inequality comparison operators
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum EqComparison {
    EQ,
    NE,
}

impl Not for EqComparison {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            EqComparison::EQ => EqComparison::NE,
            EqComparison::NE => EqComparison::EQ,
        }
    }
}

/// Exception handler entry
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExceptionCatch {
    /// Start of the covered range (inclusive)
    pub try_start: Label,

    /// End of the covered range (exclusive)
    pub try_end: Label,

    /// Where to jump when the exception is caught
    pub handler: Label,

    /// Type of exception caught (`None` catches everything, as for `finally`)
    pub catch_type: Option<BinaryName>,
}

/// Entry in the `LocalVariableTable`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LocalVariable {
    pub slot: u16,
    pub name: UnqualifiedName,
    pub descriptor: FieldType,

    /// Start of the variable's scope (inclusive)
    pub start: Label,

    /// End of the variable's scope (exclusive)
    pub end: Label,
}

/// Entry in the `LocalVariableTypeTable`
///
/// The signature is kept in its raw string form.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LocalVariableType {
    pub slot: u16,
    pub name: UnqualifiedName,
    pub signature: String,

    /// Start of the variable's scope (inclusive)
    pub start: Label,

    /// End of the variable's scope (exclusive)
    pub end: Label,
}

impl fmt::Display for CodeElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeElement::Load(kind, slot) => write!(f, "{}load {}", kind.mnemonic_prefix(), slot),
            CodeElement::Store(kind, slot) => {
                write!(f, "{}store {}", kind.mnemonic_prefix(), slot)
            }
            CodeElement::Increment(slot, by) => write!(f, "iinc {} {}", slot, by),
            CodeElement::Constant(constant) => match constant {
                ConstantInstruction::Null => f.write_str("aconst_null"),
                ConstantInstruction::Int(-1) => f.write_str("iconst_m1"),
                ConstantInstruction::Int(n @ 0..=5) => write!(f, "iconst_{}", n),
                ConstantInstruction::Int(n @ -128..=127) => write!(f, "bipush {}", n),
                ConstantInstruction::Int(n) => write!(f, "sipush {}", n),
                ConstantInstruction::Long0 => f.write_str("lconst_0"),
                ConstantInstruction::Long1 => f.write_str("lconst_1"),
                ConstantInstruction::Float0 => f.write_str("fconst_0"),
                ConstantInstruction::Float1 => f.write_str("fconst_1"),
                ConstantInstruction::Float2 => f.write_str("fconst_2"),
                ConstantInstruction::Double0 => f.write_str("dconst_0"),
                ConstantInstruction::Double1 => f.write_str("dconst_1"),
            },
            CodeElement::Operator(operator) => f.write_str(operator.mnemonic()),
            CodeElement::Branch(branch) => match branch {
                BranchInstruction::If(op, lbl) => write!(f, "if{} {}", op.suffix(), lbl),
                BranchInstruction::IfICmp(op, lbl) => {
                    write!(f, "if_icmp{} {}", op.suffix(), lbl)
                }
                BranchInstruction::IfACmp(EqComparison::EQ, lbl) => write!(f, "if_acmpeq {}", lbl),
                BranchInstruction::IfACmp(EqComparison::NE, lbl) => write!(f, "if_acmpne {}", lbl),
                BranchInstruction::IfNull(EqComparison::EQ, lbl) => write!(f, "ifnull {}", lbl),
                BranchInstruction::IfNull(EqComparison::NE, lbl) => write!(f, "ifnonnull {}", lbl),
                BranchInstruction::Goto(lbl) => write!(f, "goto {}", lbl),
                BranchInstruction::TableSwitch {
                    default,
                    low,
                    targets,
                } => {
                    write!(f, "tableswitch {} {}", low, default)?;
                    for target in targets {
                        write!(f, " {}", target)?;
                    }
                    Ok(())
                }
                BranchInstruction::LookupSwitch { default, targets } => {
                    write!(f, "lookupswitch {}", default)?;
                    for (key, target) in targets {
                        write!(f, " {}:{}", key, target)?;
                    }
                    Ok(())
                }
            },
            CodeElement::Return(kind) => write!(f, "{}return", kind.mnemonic_prefix()),
            CodeElement::Throw => f.write_str("athrow"),
            CodeElement::LabelTarget(lbl) => write!(f, "{}:", lbl),
            CodeElement::LineNumber(line) => write!(f, "line {}", line),
            CodeElement::ExceptionCatch(catch) => {
                write!(
                    f,
                    "catch {} {} {} ",
                    catch.try_start, catch.try_end, catch.handler
                )?;
                match &catch.catch_type {
                    Some(class) => write!(f, "{}", class),
                    None => f.write_str("any"),
                }
            }
            CodeElement::LocalVariable(local) => write!(
                f,
                "local {} {} {} {} {}",
                local.slot,
                local.name,
                local.descriptor.render(),
                local.start,
                local.end
            ),
            CodeElement::LocalVariableType(local) => write!(
                f,
                "localtype {} {} {} {} {}",
                local.slot, local.name, local.signature, local.start, local.end
            ),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{LabelGenerator, LabelTable};

    #[test]
    fn branch_kinds() {
        let mut labels = LabelTable::new();
        let lbl = labels.fresh_label();

        let goto = CodeElement::Branch(BranchInstruction::Goto(lbl));
        let ifeq = CodeElement::Branch(BranchInstruction::If(OrdComparison::EQ, lbl));
        let switch = CodeElement::Branch(BranchInstruction::TableSwitch {
            default: lbl,
            low: 0,
            targets: vec![lbl],
        });
        assert_eq!(goto.branch_kind(), BranchKind::Unconditional);
        assert_eq!(ifeq.branch_kind(), BranchKind::Conditional);
        assert_eq!(switch.branch_kind(), BranchKind::Unconditional);
        assert_eq!(
            CodeElement::Return(TypeKind::Void).branch_kind(),
            BranchKind::Unconditional
        );
        assert_eq!(CodeElement::Throw.branch_kind(), BranchKind::Unconditional);
        assert_eq!(
            CodeElement::Load(TypeKind::Int, 0).branch_kind(),
            BranchKind::None
        );
    }

    #[test]
    fn pseudo_elements() {
        let mut labels = LabelTable::new();
        let lbl = labels.fresh_label();

        assert!(CodeElement::LabelTarget(lbl).is_pseudo());
        assert!(CodeElement::LineNumber(3).is_pseudo());
        assert!(!CodeElement::Operator(Operator::Nop).is_pseudo());
        assert!(!CodeElement::Branch(BranchInstruction::Goto(lbl)).is_pseudo());
    }

    #[test]
    fn local_slots() {
        let mut labels = LabelTable::new();
        let start = labels.fresh_label();
        let end = labels.fresh_label();

        assert_eq!(
            CodeElement::Increment(4, -1).local_slot(),
            Some((4, TypeKind::Int))
        );
        let local = CodeElement::LocalVariable(LocalVariable {
            slot: 2,
            name: UnqualifiedName::number(2),
            descriptor: FieldType::double(),
            start,
            end,
        });
        assert_eq!(local.local_slot(), Some((2, TypeKind::Double)));
        assert_eq!(local.referenced_labels(), vec![start, end]);
        assert_eq!(CodeElement::Throw.local_slot(), None);

        let moved = local.with_local_slot(6);
        assert_eq!(moved.local_slot(), Some((6, TypeKind::Double)));
        assert_eq!(moved.referenced_labels(), vec![start, end]);
        assert_eq!(
            CodeElement::Increment(4, -1).with_local_slot(9),
            CodeElement::Increment(9, -1)
        );
        assert_eq!(CodeElement::Throw.with_local_slot(9), CodeElement::Throw);
    }

    #[test]
    fn inverted_conditions() {
        assert_eq!(
            !Condition::IfICmp(OrdComparison::LT),
            Condition::IfICmp(OrdComparison::GE)
        );
        assert_eq!(
            !Condition::IfNull(EqComparison::EQ),
            Condition::IfNull(EqComparison::NE)
        );
    }

    #[test]
    fn mnemonics() {
        let mut labels = LabelTable::new();
        let lbl = labels.fresh_label();

        let rendered: Vec<String> = vec![
            CodeElement::Load(TypeKind::Long, 3),
            CodeElement::Store(TypeKind::Boolean, 1),
            CodeElement::Constant(ConstantInstruction::Int(-1)),
            CodeElement::Constant(ConstantInstruction::Int(100)),
            CodeElement::Constant(ConstantInstruction::Int(1000)),
            CodeElement::Branch(BranchInstruction::IfICmp(OrdComparison::LE, lbl)),
            CodeElement::Return(TypeKind::Void),
            CodeElement::Return(TypeKind::Reference),
            CodeElement::LabelTarget(lbl),
        ]
        .iter()
        .map(|element| element.to_string())
        .collect();

        assert_eq!(
            rendered,
            vec![
                "lload 3",
                "istore 1",
                "iconst_m1",
                "bipush 100",
                "sipush 1000",
                "if_icmple l0",
                "return",
                "areturn",
                "l0:",
            ]
        );
        assert_eq!(Operator::from_mnemonic("dup2_x1"), Some(Operator::Dup2X1));
        assert_eq!(Operator::from_mnemonic("iload"), None);
    }
}
