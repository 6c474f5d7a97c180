use strum_macros::{Display, EnumString};

/// Types are stored in a table keyed by id; pointer and struct members
/// reference other types by id, which keeps the (possibly cyclic) type
/// graph free of owning references.
pub type TypeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum PrimitiveKind {
    Int,
    Unsigned,
    Float,
    Char,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructMember {
    pub name: String,
    pub type_id: TypeId,
    pub offset: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Primitive {
        kind: PrimitiveKind,
        size: u64,
    },
    Pointer {
        pointee: TypeId,
        size: u64,
    },
    Array {
        element: TypeId,
        count: u64,
    },
    /// Member offsets may be interleaved; semantics match C structs.
    Structured {
        name: String,
        size: u64,
        members: Vec<StructMember>,
    },
}
