use crate::error::CliError;
use classweave::jvm::code::{
    BranchInstruction, CodeBuilder, CodeElement, ConstantInstruction, EqComparison,
    ExceptionCatch, Label, LocalVariable, LocalVariableType, Operator, OrdComparison,
};
use classweave::jvm::{BinaryName, FieldType, Name, ParseDescriptor, TypeKind, UnqualifiedName};
use std::collections::HashMap;
use std::str::{FromStr, SplitWhitespace};

/// Reads fragments written one element per line, in the same syntax elements are displayed in
///
/// Labels are referred to by name. Names are turned into labels of the builder the fragment is
/// meant for, the first time they show up. Everything after a `#` is a comment.
#[derive(Default)]
pub struct Assembler {
    labels: HashMap<String, Label>,
    label_order: Vec<String>,
}

impl Assembler {
    pub fn new() -> Assembler {
        Assembler::default()
    }

    /// Named labels, in the order they were first mentioned
    pub fn labels(&self) -> impl Iterator<Item = (&str, Label)> + '_ {
        self.label_order
            .iter()
            .map(move |name| (name.as_str(), self.labels[name]))
    }

    pub fn parse(
        &mut self,
        source: &str,
        builder: &mut dyn CodeBuilder,
    ) -> Result<Vec<CodeElement>, CliError> {
        let mut elements = vec![];
        for (line_number, line) in source.lines().enumerate() {
            let line = match line.find('#') {
                Some(comment) => &line[..comment],
                None => line,
            };
            let parsed = self
                .parse_line(line, builder)
                .map_err(|message| CliError::Assembly {
                    line: line_number + 1,
                    message,
                })?;
            elements.extend(parsed);
        }
        log::debug!("Parsed {} elements", elements.len());
        Ok(elements)
    }

    fn label(&mut self, name: &str, builder: &mut dyn CodeBuilder) -> Label {
        if let Some(label) = self.labels.get(name) {
            return *label;
        }
        let label = builder.fresh_label();
        self.labels.insert(name.to_owned(), label);
        self.label_order.push(name.to_owned());
        label
    }

    fn label_operand(
        &mut self,
        tokens: &mut SplitWhitespace,
        builder: &mut dyn CodeBuilder,
    ) -> Result<Label, String> {
        let name = tokens.next().ok_or("missing label operand")?;
        Ok(self.label(name, builder))
    }

    fn parse_line(
        &mut self,
        line: &str,
        builder: &mut dyn CodeBuilder,
    ) -> Result<Option<CodeElement>, String> {
        let mut tokens = line.split_whitespace();
        let mnemonic = match tokens.next() {
            None => return Ok(None),
            Some(mnemonic) => mnemonic,
        };

        let element = if let Some(name) = mnemonic.strip_suffix(':') {
            CodeElement::LabelTarget(self.label(name, builder))
        } else {
            match mnemonic {
                "iinc" => {
                    let slot = operand(&mut tokens, "slot")?;
                    CodeElement::Increment(slot, operand(&mut tokens, "increment")?)
                }
                "aconst_null" => CodeElement::Constant(ConstantInstruction::Null),
                "iconst_m1" => CodeElement::Constant(ConstantInstruction::Int(-1)),
                "bipush" | "sipush" => {
                    CodeElement::Constant(ConstantInstruction::Int(operand(&mut tokens, "value")?))
                }
                "lconst_0" => CodeElement::Constant(ConstantInstruction::Long0),
                "lconst_1" => CodeElement::Constant(ConstantInstruction::Long1),
                "fconst_0" => CodeElement::Constant(ConstantInstruction::Float0),
                "fconst_1" => CodeElement::Constant(ConstantInstruction::Float1),
                "fconst_2" => CodeElement::Constant(ConstantInstruction::Float2),
                "dconst_0" => CodeElement::Constant(ConstantInstruction::Double0),
                "dconst_1" => CodeElement::Constant(ConstantInstruction::Double1),
                "goto" => CodeElement::Branch(BranchInstruction::Goto(
                    self.label_operand(&mut tokens, builder)?,
                )),
                "if_acmpeq" | "if_acmpne" | "ifnull" | "ifnonnull" => {
                    let target = self.label_operand(&mut tokens, builder)?;
                    CodeElement::Branch(match mnemonic {
                        "if_acmpeq" => BranchInstruction::IfACmp(EqComparison::EQ, target),
                        "if_acmpne" => BranchInstruction::IfACmp(EqComparison::NE, target),
                        "ifnull" => BranchInstruction::IfNull(EqComparison::EQ, target),
                        _ => BranchInstruction::IfNull(EqComparison::NE, target),
                    })
                }
                "tableswitch" => {
                    let low = operand(&mut tokens, "low")?;
                    let default = self.label_operand(&mut tokens, builder)?;
                    let targets: Vec<Label> = tokens
                        .by_ref()
                        .map(|name| self.label(name, builder))
                        .collect();
                    if targets.is_empty() {
                        return Err(String::from("tableswitch needs at least one target"));
                    }
                    CodeElement::Branch(BranchInstruction::TableSwitch {
                        default,
                        low,
                        targets,
                    })
                }
                "lookupswitch" => {
                    let default = self.label_operand(&mut tokens, builder)?;
                    let mut targets = vec![];
                    for pair in tokens.by_ref() {
                        let (key, name) = pair
                            .split_once(':')
                            .ok_or_else(|| format!("expected 'key:label', got '{}'", pair))?;
                        let key = key
                            .parse::<i32>()
                            .map_err(|_| format!("invalid switch key '{}'", key))?;
                        targets.push((key, self.label(name, builder)));
                    }
                    CodeElement::Branch(BranchInstruction::LookupSwitch { default, targets })
                }
                "return" => CodeElement::Return(TypeKind::Void),
                "athrow" => CodeElement::Throw,
                "line" => CodeElement::LineNumber(operand(&mut tokens, "line number")?),
                "catch" => {
                    let try_start = self.label_operand(&mut tokens, builder)?;
                    let try_end = self.label_operand(&mut tokens, builder)?;
                    let handler = self.label_operand(&mut tokens, builder)?;
                    let catch_type = match tokens.next().ok_or("missing catch type")? {
                        "any" => None,
                        class => Some(BinaryName::from_string(class.to_owned())?),
                    };
                    CodeElement::ExceptionCatch(ExceptionCatch {
                        try_start,
                        try_end,
                        handler,
                        catch_type,
                    })
                }
                "local" => {
                    let slot = operand(&mut tokens, "slot")?;
                    let name = name_operand(&mut tokens)?;
                    let descriptor = tokens.next().ok_or("missing descriptor")?;
                    let descriptor = FieldType::parse(descriptor).map_err(|err| err.to_string())?;
                    CodeElement::LocalVariable(LocalVariable {
                        slot,
                        name,
                        descriptor,
                        start: self.label_operand(&mut tokens, builder)?,
                        end: self.label_operand(&mut tokens, builder)?,
                    })
                }
                "localtype" => {
                    let slot = operand(&mut tokens, "slot")?;
                    let name = name_operand(&mut tokens)?;
                    let signature = tokens.next().ok_or("missing signature")?.to_owned();
                    CodeElement::LocalVariableType(LocalVariableType {
                        slot,
                        name,
                        signature,
                        start: self.label_operand(&mut tokens, builder)?,
                        end: self.label_operand(&mut tokens, builder)?,
                    })
                }
                _ => self.parse_family(mnemonic, &mut tokens, builder)?,
            }
        };

        match tokens.next() {
            None => Ok(Some(element)),
            Some(extra) => Err(format!("unexpected operand '{}'", extra)),
        }
    }

    /// Instructions whose mnemonics follow a pattern (typed, numbered, or comparison suffixed)
    fn parse_family(
        &mut self,
        mnemonic: &str,
        tokens: &mut SplitWhitespace,
        builder: &mut dyn CodeBuilder,
    ) -> Result<CodeElement, String> {
        if let Some(operator) = Operator::from_mnemonic(mnemonic) {
            return Ok(CodeElement::Operator(operator));
        }
        if let Some(n) = mnemonic.strip_prefix("iconst_") {
            let n = n
                .parse::<i16>()
                .ok()
                .filter(|n| (0..=5).contains(n))
                .ok_or_else(|| format!("unknown instruction '{}'", mnemonic))?;
            return Ok(CodeElement::Constant(ConstantInstruction::Int(n)));
        }
        if let Some(suffix) = mnemonic.strip_prefix("if_icmp") {
            let op = OrdComparison::from_suffix(suffix)
                .ok_or_else(|| format!("unknown comparison '{}'", suffix))?;
            let target = self.label_operand(tokens, builder)?;
            return Ok(CodeElement::Branch(BranchInstruction::IfICmp(op, target)));
        }
        if let Some(op) = mnemonic.strip_prefix("if").and_then(OrdComparison::from_suffix) {
            let target = self.label_operand(tokens, builder)?;
            return Ok(CodeElement::Branch(BranchInstruction::If(op, target)));
        }

        let mut chars = mnemonic.chars();
        let kind = chars
            .next()
            .and_then(TypeKind::from_mnemonic_prefix)
            .ok_or_else(|| format!("unknown instruction '{}'", mnemonic))?;
        match chars.as_str() {
            "return" => Ok(CodeElement::Return(kind)),
            "load" => Ok(CodeElement::Load(kind, operand(tokens, "slot")?)),
            "store" => Ok(CodeElement::Store(kind, operand(tokens, "slot")?)),
            rest => {
                if let Some(slot) = rest.strip_prefix("load_").and_then(short_slot) {
                    Ok(CodeElement::Load(kind, slot))
                } else if let Some(slot) = rest.strip_prefix("store_").and_then(short_slot) {
                    Ok(CodeElement::Store(kind, slot))
                } else {
                    Err(format!("unknown instruction '{}'", mnemonic))
                }
            }
        }
    }
}

/// Slot in `xload_<n>` or `xstore_<n>`
fn short_slot(n: &str) -> Option<u16> {
    n.parse().ok().filter(|n| *n <= 3)
}

fn operand<T: FromStr>(tokens: &mut SplitWhitespace, what: &str) -> Result<T, String> {
    let token = tokens
        .next()
        .ok_or_else(|| format!("missing {} operand", what))?;
    token
        .parse()
        .map_err(|_| format!("invalid {} operand '{}'", what, token))
}

fn name_operand(tokens: &mut SplitWhitespace) -> Result<UnqualifiedName, String> {
    let name = tokens.next().ok_or("missing local variable name")?;
    UnqualifiedName::from_string(name.to_owned())
}
