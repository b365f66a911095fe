use super::{
    BranchInstruction, BuilderRole, BuilderRoleMut, CodeBuilder, CodeElement,
    ConstantInstruction, EqComparison, Label, LabelGenerator, LabelTable, OrdComparison,
};
use crate::jvm::{
    BinaryName, Error, FieldType, MethodAccessFlags, MethodDescriptor, TypeKind, UnqualifiedName,
};
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use std::convert::TryFrom;

/// Longest code array a method may have
const MAX_CODE_LENGTH: usize = 65535;

const WIDE: u8 = 0xc4;
const IINC: u8 = 0x84;

/// Materialized method body
#[derive(Clone, Debug, PartialEq)]
pub struct MethodBody {
    /// Bytecode array
    pub code: Vec<u8>,

    /// Number of local variable slots the method needs
    pub max_locals: u16,

    /// Offset of every label which got bound (indexed by label)
    pub label_offsets: Vec<Option<u16>>,

    pub exception_table: Vec<ExceptionTableEntry>,
    pub line_numbers: Vec<LineNumberEntry>,
    pub local_variables: Vec<LocalVariableEntry>,
    pub local_variable_types: Vec<LocalVariableTypeEntry>,
}

impl MethodBody {
    /// Bytecode offset at which a label got bound
    pub fn label_offset(&self, label: Label) -> Option<u16> {
        self.label_offsets.get(label.index()).copied().flatten()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExceptionTableEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_type: Option<BinaryName>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LineNumberEntry {
    pub start_pc: u16,
    pub line_number: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalVariableEntry {
    pub start_pc: u16,
    pub length: u16,
    pub name: UnqualifiedName,
    pub descriptor: FieldType,
    pub slot: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalVariableTypeEntry {
    pub start_pc: u16,
    pub length: u16,
    pub name: UnqualifiedName,
    pub signature: String,
    pub slot: u16,
}

/// Branch operand to patch once its target is known
struct Fixup {
    label: Label,

    /// Offset of the branch opcode (offsets are relative to it)
    instruction_offset: usize,

    /// Offset of the operand to patch
    operand_offset: usize,

    /// Is the operand 4 bytes (switches) rather than 2?
    wide: bool,
}

/// Number of local slots taken by the receiver and parameters of a method
fn fixed_locals(flags: MethodAccessFlags, descriptor: &MethodDescriptor) -> Result<u16, Error> {
    u16::try_from(descriptor.parameter_length(flags.has_receiver()))
        .map_err(|_| Error::LocalsOverflow)
}

/// Terminal builder which encodes bytecode as soon as elements arrive
///
/// This is the single-pass terminal: once an instruction has been pushed, its bytes are final
/// except for branch offsets to labels that were not bound yet. Those get recorded as fixups and
/// are patched in `finish`. Since jumps are never widened, a method whose branches span more than
/// 32 KiB fails to finish rather than falling back to `goto_w`.
pub struct DirectCodeBuilder {
    code: Vec<u8>,
    labels: LabelTable,
    fixups: Vec<Fixup>,

    /// Next free local slot (only ever bumped by `allocate_local`)
    top_local: u16,

    /// Largest slot end seen so far in any element
    max_locals: u32,

    catches: Vec<(Label, Label, Label, Option<BinaryName>)>,
    line_numbers: Vec<LineNumberEntry>,
    local_variables: Vec<(Label, Label, UnqualifiedName, FieldType, u16)>,
    local_variable_types: Vec<(Label, Label, UnqualifiedName, String, u16)>,
}

impl DirectCodeBuilder {
    /// Builder for the body of a method with the given flags and descriptor
    ///
    /// The receiver (if any) and parameters are already in the locals.
    pub fn new(
        flags: MethodAccessFlags,
        descriptor: &MethodDescriptor,
    ) -> Result<DirectCodeBuilder, Error> {
        fixed_locals(flags, descriptor).map(DirectCodeBuilder::with_initial_locals)
    }

    /// Builder for a body whose first `top_local` slots are already taken
    pub fn with_initial_locals(top_local: u16) -> DirectCodeBuilder {
        DirectCodeBuilder {
            code: vec![],
            labels: LabelTable::new(),
            fixups: vec![],
            top_local,
            max_locals: top_local as u32,
            catches: vec![],
            line_numbers: vec![],
            local_variables: vec![],
            local_variable_types: vec![],
        }
    }

    /// Pick up where a buffered builder left off
    pub(crate) fn resume(top_local: u16, labels: usize) -> DirectCodeBuilder {
        let mut builder = DirectCodeBuilder::with_initial_locals(top_local);
        builder.labels.reserve_labels(labels);
        builder
    }

    /// Next free local slot
    pub fn cur_top_local(&self) -> u16 {
        self.top_local
    }

    fn note_local(&mut self, slot: u16, kind: TypeKind) -> Result<(), Error> {
        if kind == TypeKind::Void {
            return Err(Error::VoidLocal);
        }
        self.max_locals = self.max_locals.max(slot as u32 + kind.slot_size() as u32);
        Ok(())
    }

    /// Write an instruction with a local variable operand, picking the shortest encoding
    fn push_local_insn(&mut self, short_base: u8, normal: u8, slot: u16) -> Result<(), Error> {
        if slot <= 3 {
            self.code.write_u8(short_base + slot as u8)?;
        } else if let Ok(slot) = u8::try_from(slot) {
            self.code.write_u8(normal)?;
            self.code.write_u8(slot)?;
        } else {
            self.code.write_u8(WIDE)?;
            self.code.write_u8(normal)?;
            self.code.write_u16::<BigEndian>(slot)?;
        }
        Ok(())
    }

    /// Write a branch offset, or a placeholder and a fixup if the label isn't bound yet
    fn push_offset(&mut self, label: Label, instruction_offset: usize, wide: bool) -> Result<(), Error> {
        let operand_offset = self.code.len();
        match self.labels.position(label) {
            Some(target) => {
                let offset = target as isize - instruction_offset as isize;
                if wide {
                    self.code.write_i32::<BigEndian>(offset as i32)?;
                } else {
                    self.code.write_i16::<BigEndian>(short_offset(label, offset)?)?;
                }
            }
            None => {
                self.fixups.push(Fixup {
                    label,
                    instruction_offset,
                    operand_offset,
                    wide,
                });
                if wide {
                    self.code.write_i32::<BigEndian>(0)?;
                } else {
                    self.code.write_i16::<BigEndian>(0)?;
                }
            }
        }
        Ok(())
    }

    /// Pad to a 4-byte boundary (switch operands are aligned relative to the start of the code)
    fn push_switch_padding(&mut self) -> Result<(), Error> {
        while self.code.len() % 4 != 0 {
            self.code.write_u8(0)?;
        }
        Ok(())
    }

    fn push_branch(&mut self, branch: BranchInstruction) -> Result<(), Error> {
        let instruction_offset = self.code.len();
        let (opcode, target) = match branch {
            BranchInstruction::If(op, target) => (0x99 + ord_comparison_index(op), target),
            BranchInstruction::IfICmp(op, target) => (0x9f + ord_comparison_index(op), target),
            BranchInstruction::IfACmp(EqComparison::EQ, target) => (0xa5, target),
            BranchInstruction::IfACmp(EqComparison::NE, target) => (0xa6, target),
            BranchInstruction::IfNull(EqComparison::EQ, target) => (0xc6, target),
            BranchInstruction::IfNull(EqComparison::NE, target) => (0xc7, target),
            BranchInstruction::Goto(target) => (0xa7, target),
            BranchInstruction::TableSwitch {
                default,
                low,
                targets,
            } => {
                let high = table_switch_high(low, targets.len())?;
                self.code.write_u8(0xaa)?;
                self.push_switch_padding()?;
                self.push_offset(default, instruction_offset, true)?;
                self.code.write_i32::<BigEndian>(low)?;
                self.code.write_i32::<BigEndian>(high)?;
                for target in targets {
                    self.push_offset(target, instruction_offset, true)?;
                }
                return Ok(());
            }
            BranchInstruction::LookupSwitch {
                default,
                mut targets,
            } => {
                targets.sort_by_key(|(key, _)| *key);
                self.code.write_u8(0xab)?;
                self.push_switch_padding()?;
                self.push_offset(default, instruction_offset, true)?;
                self.code.write_i32::<BigEndian>(targets.len() as i32)?;
                for (key, target) in targets {
                    self.code.write_i32::<BigEndian>(key)?;
                    self.push_offset(target, instruction_offset, true)?;
                }
                return Ok(());
            }
        };
        self.code.write_u8(opcode)?;
        self.push_offset(target, instruction_offset, false)
    }

    fn resolve(&self, label: Label) -> Result<u16, Error> {
        match self.labels.position(label) {
            Some(offset) => Ok(offset as u16),
            None => Err(Error::UnboundLabel(label)),
        }
    }

    /// Resolve a local variable scope into its start and length
    fn resolve_scope(&self, start: Label, end: Label) -> Result<(u16, u16), Error> {
        let start_pc = self.resolve(start)?;
        let end_pc = self.resolve(end)?;
        if end_pc < start_pc {
            return Err(Error::InvalidLocalScope { start, end });
        }
        Ok((start_pc, end_pc - start_pc))
    }

    /// Patch pending branches and assemble the method body
    pub fn finish(mut self) -> Result<MethodBody, Error> {
        if self.code.len() > MAX_CODE_LENGTH {
            return Err(Error::MethodCodeOverflow(self.code.len()));
        }

        for fixup in std::mem::take(&mut self.fixups) {
            let target = self
                .labels
                .position(fixup.label)
                .ok_or(Error::UnboundLabel(fixup.label))?;
            let offset = target as isize - fixup.instruction_offset as isize;
            if fixup.wide {
                BigEndian::write_i32(&mut self.code[fixup.operand_offset..], offset as i32);
            } else {
                let offset = short_offset(fixup.label, offset)?;
                BigEndian::write_i16(&mut self.code[fixup.operand_offset..], offset);
            }
        }

        let mut exception_table = vec![];
        for (try_start, try_end, handler, catch_type) in &self.catches {
            exception_table.push(ExceptionTableEntry {
                start_pc: self.resolve(*try_start)?,
                end_pc: self.resolve(*try_end)?,
                handler_pc: self.resolve(*handler)?,
                catch_type: catch_type.clone(),
            });
        }

        let mut local_variables = vec![];
        for (start, end, name, descriptor, slot) in &self.local_variables {
            let (start_pc, length) = self.resolve_scope(*start, *end)?;
            local_variables.push(LocalVariableEntry {
                start_pc,
                length,
                name: name.clone(),
                descriptor: descriptor.clone(),
                slot: *slot,
            });
        }

        let mut local_variable_types = vec![];
        for (start, end, name, signature, slot) in &self.local_variable_types {
            let (start_pc, length) = self.resolve_scope(*start, *end)?;
            local_variable_types.push(LocalVariableTypeEntry {
                start_pc,
                length,
                name: name.clone(),
                signature: signature.clone(),
                slot: *slot,
            });
        }

        let max_locals = u16::try_from(self.max_locals.max(self.top_local as u32))
            .map_err(|_| Error::LocalsOverflow)?;
        let label_offsets = (0..self.labels.len())
            .map(|index| {
                self.labels
                    .position(Label::from_index(index))
                    .map(|offset| offset as u16)
            })
            .collect();

        log::debug!(
            "Finished method body with {} bytes of code and {} locals",
            self.code.len(),
            max_locals
        );

        Ok(MethodBody {
            code: self.code,
            max_locals,
            label_offsets,
            exception_table,
            line_numbers: self.line_numbers,
            local_variables,
            local_variable_types,
        })
    }
}

/// Index of a comparison in the order the JVM lays out `ifeq`..`ifle` and `if_icmpeq`..`if_icmple`
fn ord_comparison_index(op: OrdComparison) -> u8 {
    match op {
        OrdComparison::EQ => 0,
        OrdComparison::NE => 1,
        OrdComparison::LT => 2,
        OrdComparison::GE => 3,
        OrdComparison::GT => 4,
        OrdComparison::LE => 5,
    }
}

/// Highest key of a `tableswitch`, which must be at least `low`
fn table_switch_high(low: i32, count: usize) -> Result<i32, Error> {
    count
        .checked_sub(1)
        .and_then(|extra| i32::try_from(extra).ok())
        .and_then(|extra| low.checked_add(extra))
        .ok_or(Error::InvalidSwitch { low, count })
}

fn short_offset(label: Label, offset: isize) -> Result<i16, Error> {
    i16::try_from(offset).map_err(|_| Error::BranchOffsetOverflow { label, offset })
}

/// `(xload_0, xload)` opcodes for each computational kind
fn load_opcodes(kind: TypeKind) -> Result<(u8, u8), Error> {
    match kind.computational() {
        TypeKind::Int => Ok((0x1a, 0x15)),
        TypeKind::Long => Ok((0x1e, 0x16)),
        TypeKind::Float => Ok((0x22, 0x17)),
        TypeKind::Double => Ok((0x26, 0x18)),
        TypeKind::Reference => Ok((0x2a, 0x19)),
        _ => Err(Error::VoidLocal),
    }
}

/// `(xstore_0, xstore)` opcodes for each computational kind
fn store_opcodes(kind: TypeKind) -> Result<(u8, u8), Error> {
    match kind.computational() {
        TypeKind::Int => Ok((0x3b, 0x36)),
        TypeKind::Long => Ok((0x3f, 0x37)),
        TypeKind::Float => Ok((0x43, 0x38)),
        TypeKind::Double => Ok((0x47, 0x39)),
        TypeKind::Reference => Ok((0x4b, 0x3a)),
        _ => Err(Error::VoidLocal),
    }
}

fn return_opcode(kind: TypeKind) -> u8 {
    match kind.computational() {
        TypeKind::Int => 0xac,
        TypeKind::Long => 0xad,
        TypeKind::Float => 0xae,
        TypeKind::Double => 0xaf,
        TypeKind::Reference => 0xb0,
        _ => 0xb1,
    }
}

impl CodeBuilder for DirectCodeBuilder {
    fn with(&mut self, element: CodeElement) -> Result<(), Error> {
        log::trace!("{:>5}: {}", self.code.len(), element);
        if let Some((slot, kind)) = element.local_slot() {
            self.note_local(slot, kind)?;
        }
        match element {
            CodeElement::Load(kind, slot) => {
                let (short_base, normal) = load_opcodes(kind)?;
                self.push_local_insn(short_base, normal, slot)?;
            }
            CodeElement::Store(kind, slot) => {
                let (short_base, normal) = store_opcodes(kind)?;
                self.push_local_insn(short_base, normal, slot)?;
            }
            CodeElement::Increment(slot, by) => {
                match (u8::try_from(slot), i8::try_from(by)) {
                    (Ok(slot), Ok(by)) => {
                        self.code.write_u8(IINC)?;
                        self.code.write_u8(slot)?;
                        self.code.write_i8(by)?;
                    }
                    _ => {
                        self.code.write_u8(WIDE)?;
                        self.code.write_u8(IINC)?;
                        self.code.write_u16::<BigEndian>(slot)?;
                        self.code.write_i16::<BigEndian>(by)?;
                    }
                }
            }
            CodeElement::Constant(constant) => match constant {
                ConstantInstruction::Null => self.code.write_u8(0x01)?,
                ConstantInstruction::Int(n @ -1..=5) => self.code.write_u8((0x03 + n) as u8)?,
                ConstantInstruction::Int(n) => match i8::try_from(n) {
                    Ok(n) => {
                        self.code.write_u8(0x10)?;
                        self.code.write_i8(n)?;
                    }
                    Err(_) => {
                        self.code.write_u8(0x11)?;
                        self.code.write_i16::<BigEndian>(n)?;
                    }
                },
                ConstantInstruction::Long0 => self.code.write_u8(0x09)?,
                ConstantInstruction::Long1 => self.code.write_u8(0x0a)?,
                ConstantInstruction::Float0 => self.code.write_u8(0x0b)?,
                ConstantInstruction::Float1 => self.code.write_u8(0x0c)?,
                ConstantInstruction::Float2 => self.code.write_u8(0x0d)?,
                ConstantInstruction::Double0 => self.code.write_u8(0x0e)?,
                ConstantInstruction::Double1 => self.code.write_u8(0x0f)?,
            },
            CodeElement::Operator(operator) => self.code.write_u8(operator.opcode())?,
            CodeElement::Branch(branch) => self.push_branch(branch)?,
            CodeElement::Return(kind) => self.code.write_u8(return_opcode(kind))?,
            CodeElement::Throw => self.code.write_u8(0xbf)?,
            CodeElement::LabelTarget(label) => self.labels.bind(label, self.code.len())?,
            CodeElement::LineNumber(line_number) => self.line_numbers.push(LineNumberEntry {
                start_pc: self.code.len() as u16,
                line_number,
            }),
            CodeElement::ExceptionCatch(catch) => self.catches.push((
                catch.try_start,
                catch.try_end,
                catch.handler,
                catch.catch_type,
            )),
            CodeElement::LocalVariable(local) => {
                self.local_variables.push((
                    local.start,
                    local.end,
                    local.name,
                    local.descriptor,
                    local.slot,
                ));
            }
            CodeElement::LocalVariableType(local) => {
                self.local_variable_types.push((
                    local.start,
                    local.end,
                    local.name,
                    local.signature,
                    local.slot,
                ));
            }
        }
        Ok(())
    }

    fn fresh_label(&mut self) -> Label {
        self.labels.fresh_label()
    }

    fn allocate_local(&mut self, kind: TypeKind) -> Result<u16, Error> {
        if kind == TypeKind::Void {
            return Err(Error::VoidLocal);
        }
        let slot = self.top_local;
        self.top_local = slot
            .checked_add(kind.slot_size())
            .ok_or(Error::LocalsOverflow)?;
        self.max_locals = self.max_locals.max(self.top_local as u32);
        Ok(slot)
    }

    fn role(&self) -> BuilderRole<'_> {
        BuilderRole::Direct(self)
    }

    fn role_mut(&mut self) -> BuilderRoleMut<'_> {
        BuilderRoleMut::Direct(self)
    }

    fn as_dyn(&mut self) -> &mut dyn CodeBuilder {
        self
    }
}

/// Terminal builder which keeps every element it receives
///
/// Earlier output stays readable through `elements`, which is handy for producers that want to
/// inspect what they already emitted. The bytecode is only produced in `finish`, by replaying
/// the elements into a [`DirectCodeBuilder`].
pub struct BufferedCodeBuilder {
    elements: Vec<CodeElement>,

    /// Labels, bound to the index of the element following them
    labels: LabelTable,

    top_local: u16,
}

impl BufferedCodeBuilder {
    pub fn new(
        flags: MethodAccessFlags,
        descriptor: &MethodDescriptor,
    ) -> Result<BufferedCodeBuilder, Error> {
        fixed_locals(flags, descriptor).map(BufferedCodeBuilder::with_initial_locals)
    }

    pub fn with_initial_locals(top_local: u16) -> BufferedCodeBuilder {
        BufferedCodeBuilder {
            elements: vec![],
            labels: LabelTable::new(),
            top_local,
        }
    }

    /// Elements received so far
    pub fn elements(&self) -> &[CodeElement] {
        &self.elements
    }

    /// Next free local slot
    pub fn cur_top_local(&self) -> u16 {
        self.top_local
    }

    /// Index of the element following a label, if it is bound yet
    pub fn label_position(&self, label: Label) -> Option<usize> {
        self.labels.position(label)
    }

    /// Encode the elements into a method body
    ///
    /// Every label an element mentions must be bound by now. This is checked before anything is
    /// encoded.
    pub fn finish(self) -> Result<MethodBody, Error> {
        for element in &self.elements {
            for label in element.referenced_labels() {
                if !self.labels.is_bound(label) {
                    return Err(Error::UnboundLabel(label));
                }
            }
        }
        log::debug!("Replaying {} buffered elements", self.elements.len());
        let mut direct = DirectCodeBuilder::resume(self.top_local, self.labels.len());
        for element in self.elements {
            direct.with(element)?;
        }
        direct.finish()
    }
}

impl CodeBuilder for BufferedCodeBuilder {
    fn with(&mut self, element: CodeElement) -> Result<(), Error> {
        if let CodeElement::LabelTarget(label) = &element {
            self.labels.bind(*label, self.elements.len())?;
        }
        log::trace!("{:>5}: {}", self.elements.len(), element);
        self.elements.push(element);
        Ok(())
    }

    fn fresh_label(&mut self) -> Label {
        self.labels.fresh_label()
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
        BuilderRole::Buffered(self)
    }

    fn role_mut(&mut self) -> BuilderRoleMut<'_> {
        BuilderRoleMut::Buffered(self)
    }

    fn as_dyn(&mut self) -> &mut dyn CodeBuilder {
        self
    }
}
