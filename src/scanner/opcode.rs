//! Instruction classes of the VM bytecode.
//!
//! Each instruction starts with a 16-bit word whose top nibble selects the class
//! and whose low 12 bits carry the primary operand. The width in words of each
//! class is fixed and must match the compiler.

/// Mask of the 12-bit operand in an instruction's leading word
pub const OPERAND_MASK: u16 = 0x0FFF;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpcodeClass {
    Stop = 0x0,
    SmallImmediate = 0x1,
    LargeImmediate = 0x2,
    Load = 0x3,
    Store = 0x4,
    LoadIndirect = 0x5,
    StoreIndirect = 0x6,
    UnaryArithmetic = 0x7,
    BinaryArithmetic = 0x8,
    Jump = 0x9,
    ConditionalBranch = 0xA,
    Emit = 0xB,
    NativeCall = 0xC,
    SubCall = 0xD,
    SubReturn = 0xE,
    Unassigned = 0xF,
}

/// Class and width in words, indexed by the top nibble
const CLASSES: [(OpcodeClass, usize); 16] = [
    (OpcodeClass::Stop, 1),
    (OpcodeClass::SmallImmediate, 1),
    (OpcodeClass::LargeImmediate, 2),
    (OpcodeClass::Load, 1),
    (OpcodeClass::Store, 1),
    (OpcodeClass::LoadIndirect, 2),
    (OpcodeClass::StoreIndirect, 2),
    (OpcodeClass::UnaryArithmetic, 1),
    (OpcodeClass::BinaryArithmetic, 1),
    (OpcodeClass::Jump, 1),
    (OpcodeClass::ConditionalBranch, 2),
    (OpcodeClass::Emit, 3),
    (OpcodeClass::NativeCall, 1),
    (OpcodeClass::SubCall, 1),
    (OpcodeClass::SubReturn, 1),
    (OpcodeClass::Unassigned, 1),
];

impl OpcodeClass {
    pub const fn decode(word: u16) -> Self {
        CLASSES[(word >> 12) as usize].0
    }

    /// Number of words the instruction occupies, leading word included
    pub const fn width(self) -> usize {
        CLASSES[self as usize].1
    }

    /// Build the leading word of an instruction
    pub const fn encode(self, operand: u16) -> u16 {
        (self as u16) << 12 | (operand & OPERAND_MASK)
    }
}

/// Unsigned 12-bit operand of a leading word
pub const fn operand(word: u16) -> u16 {
    word & OPERAND_MASK
}

/// Sign-extended 12-bit operand, used by relative jumps
pub const fn signed_operand(word: u16) -> i16 {
    ((word << 4) as i16) >> 4
}
