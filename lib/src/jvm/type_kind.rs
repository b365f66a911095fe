use super::{BaseType, Error, FieldType, ParseDescriptor};
use crate::util::Width;
use std::fmt;

/// Kind of value held in a local variable or operated on by an instruction
///
/// This is coarser than [`FieldType`]: all reference types collapse into `Reference`. Unlike
/// `FieldType`, there is a `Void` kind (for `return`), which never occupies a local slot.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum TypeKind {
    Byte,
    Short,
    Char,
    Int,
    Float,
    Long,
    Double,
    Reference,
    Boolean,
    Void,
}

impl TypeKind {
    /// Number of local variable slots taken up by a value of this kind
    pub const fn slot_size(&self) -> u16 {
        match self {
            TypeKind::Void => 0,
            TypeKind::Long | TypeKind::Double => 2,
            _ => 1,
        }
    }

    /// Kind of the type denoted by a field descriptor (or `V`)
    pub fn from_descriptor(descriptor: &str) -> Result<TypeKind, Error> {
        if descriptor == "V" {
            Ok(TypeKind::Void)
        } else {
            FieldType::parse(descriptor).map(|field_type| TypeKind::from(&field_type))
        }
    }

    /// Kind of the type denoted by a generic signature
    ///
    /// Only base type signatures are a single character, every other signature (class types, type
    /// variables, arrays) denotes a reference.
    pub fn from_signature(signature: &str) -> TypeKind {
        let mut chars = signature.chars();
        match (chars.next(), chars.next()) {
            (Some('V'), None) => TypeKind::Void,
            (Some(c), None) => BaseType::from_descriptor_char(c)
                .map(TypeKind::from)
                .unwrap_or(TypeKind::Reference),
            _ => TypeKind::Reference,
        }
    }

    /// Kind used by the JVM's typed instructions (`iload`, `lstore`, `areturn`, etc.)
    ///
    /// Sub-`int` kinds are handled by the `int` instructions.
    pub const fn computational(&self) -> TypeKind {
        match self {
            TypeKind::Byte | TypeKind::Short | TypeKind::Char | TypeKind::Boolean => TypeKind::Int,
            other => *other,
        }
    }

    /// Mnemonic prefix of typed instructions operating on this kind
    pub const fn mnemonic_prefix(&self) -> &'static str {
        match self.computational() {
            TypeKind::Int => "i",
            TypeKind::Long => "l",
            TypeKind::Float => "f",
            TypeKind::Double => "d",
            TypeKind::Reference => "a",
            _ => "",
        }
    }

    /// Inverse of `mnemonic_prefix`
    pub fn from_mnemonic_prefix(prefix: char) -> Option<TypeKind> {
        match prefix {
            'i' => Some(TypeKind::Int),
            'l' => Some(TypeKind::Long),
            'f' => Some(TypeKind::Float),
            'd' => Some(TypeKind::Double),
            'a' => Some(TypeKind::Reference),
            _ => None,
        }
    }
}

impl Width for TypeKind {
    fn width(&self) -> usize {
        self.slot_size() as usize
    }
}

impl From<BaseType> for TypeKind {
    fn from(base_type: BaseType) -> TypeKind {
        match base_type {
            BaseType::Byte => TypeKind::Byte,
            BaseType::Char => TypeKind::Char,
            BaseType::Double => TypeKind::Double,
            BaseType::Float => TypeKind::Float,
            BaseType::Int => TypeKind::Int,
            BaseType::Long => TypeKind::Long,
            BaseType::Short => TypeKind::Short,
            BaseType::Boolean => TypeKind::Boolean,
        }
    }
}

impl From<&FieldType> for TypeKind {
    fn from(field_type: &FieldType) -> TypeKind {
        match field_type {
            FieldType::Base(base_type) => TypeKind::from(*base_type),
            FieldType::Ref(_) => TypeKind::Reference,
        }
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeKind::Byte => "byte",
            TypeKind::Short => "short",
            TypeKind::Char => "char",
            TypeKind::Int => "int",
            TypeKind::Float => "float",
            TypeKind::Long => "long",
            TypeKind::Double => "double",
            TypeKind::Reference => "reference",
            TypeKind::Boolean => "boolean",
            TypeKind::Void => "void",
        };
        f.write_str(name)
    }
}
