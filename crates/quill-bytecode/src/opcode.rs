//! Bytecode opcodes for the Quill script VM
//!
//! Every instruction starts with a single opcode byte. Operands, when present,
//! follow the opcode in little-endian order. Gaps in the numbering are opcodes
//! the instruction set reserves but the VM does not implement; they decode as
//! invalid.
//!
//! Opcodes are organized into categories:
//! - 0x01-0x08: Paging & stack manipulation
//! - 0x0B-0x14: Data access (flags and words)
//! - 0x17-0x1C: Calls, frames & returns
//! - 0x1D-0x24: Branches
//! - 0x25-0x2B: Unary operations
//! - 0x2C-0x30: Arithmetic
//! - 0x33-0x38: Comparison
//! - 0x3F-0x46: Shifts, bitwise & logical
//! - 0x53-0x57: Game operations

/// Bytecode opcode enumeration
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ===== Paging & Stack Manipulation =====
    /// Jump to the start of the next 1024-byte code page
    NextBlock = 0x01,
    /// Duplicate top stack word
    Dup = 0x02,
    /// Pop and discard top stack word
    Drop = 0x03,
    /// Push 0
    Zero = 0x04,
    /// Push 1
    One = 0x05,
    /// Push integer constant (operand: i16)
    ConstInt = 0x06,
    /// Push string table index (operand: i16)
    StrLit = 0x08,

    // ===== Data Access =====
    /// Push a bit flag (operands: u8 region, u16 bit)
    GetFlag = 0x0B,
    /// Push a word (operands: u8 region, i16 offset)
    GetInt = 0x0C,
    /// Store top of stack as a bit flag without popping (operands: u8 region, u16 bit)
    PutFlag = 0x0F,
    /// Store top of stack as a word without popping (operands: u8 region, i16 offset)
    PutInt = 0x10,
    /// Pop and store as a bit flag (operands: u8 region, u16 bit)
    PutFlagV = 0x13,
    /// Pop and store as a word (operands: u8 region, i16 offset)
    PutIntV = 0x14,

    // ===== Calls, Frames & Returns =====
    /// In-module call (operands: u8 argCount, u8 region, i16 target)
    Call = 0x17,
    /// Host call, pushes the result (operands: u8 argCount, u16 function)
    Ccall = 0x18,
    /// Host call, discards the result (operands: u8 argCount, u16 function)
    CcallV = 0x19,
    /// Open a frame and reserve locals (operand: i16 byte count)
    Enter = 0x1A,
    /// Return with the popped value
    Return = 0x1B,
    /// Return without a value
    ReturnV = 0x1C,

    // ===== Branches =====
    /// Unconditional jump (operand: u16 target)
    Jmp = 0x1D,
    /// Pop, jump if non-zero (operand: u16 target)
    JmpTrueV = 0x1E,
    /// Pop, jump if zero (operand: u16 target)
    JmpFalseV = 0x1F,
    /// Peek, jump if non-zero (operand: u16 target)
    JmpTrue = 0x20,
    /// Peek, jump if zero (operand: u16 target)
    JmpFalse = 0x21,
    /// Pop selector, jump through a case table (operands: i16 count, count x (u16 value, u16 target), u16 default)
    JmpSwitch = 0x22,
    /// Weighted random branch (operands: u16 count, i16 total weight, count x (i16 weight, u16 target))
    JmpRandom = 0x24,

    // ===== Unary Operations =====
    /// Arithmetic negation: pop a, push -a
    Negate = 0x25,
    /// Logical not: pop a, push !a
    Not = 0x26,
    /// Bitwise complement: pop a, push ~a
    Compl = 0x27,
    /// Increment a word in memory (operands: u8 region, i16 offset)
    IncV = 0x28,
    /// Decrement a word in memory (operands: u8 region, i16 offset)
    DecV = 0x29,
    /// Push a word, then increment it (operands: u8 region, i16 offset)
    PostInc = 0x2A,
    /// Push a word, then decrement it (operands: u8 region, i16 offset)
    PostDec = 0x2B,

    // ===== Arithmetic =====
    /// Addition: pop b, pop a, push a + b
    Add = 0x2C,
    /// Subtraction: pop b, pop a, push a - b
    Sub = 0x2D,
    /// Multiplication: pop b, pop a, push a * b
    Mul = 0x2E,
    /// Division: pop b, pop a, push a / b
    Div = 0x2F,
    /// Remainder: pop b, pop a, push a % b
    Mod = 0x30,

    // ===== Comparison =====
    /// Equality: pop b, pop a, push a == b
    Eq = 0x33,
    /// Inequality: pop b, pop a, push a != b
    Ne = 0x34,
    /// Greater than: pop b, pop a, push a > b
    Gt = 0x35,
    /// Less than: pop b, pop a, push a < b
    Lt = 0x36,
    /// Greater or equal: pop b, pop a, push a >= b
    Ge = 0x37,
    /// Less or equal: pop b, pop a, push a <= b
    Le = 0x38,

    // ===== Shifts, Bitwise & Logical =====
    /// Arithmetic right shift: pop b, pop a, push a >> b
    Rsh = 0x3F,
    /// Left shift: pop b, pop a, push a << b
    Lsh = 0x40,
    /// Bitwise and: pop b, pop a, push a & b
    And = 0x41,
    /// Bitwise or: pop b, pop a, push a | b
    Or = 0x42,
    /// Bitwise xor: pop b, pop a, push a ^ b
    Xor = 0x43,
    /// Logical and: pop b, pop a, push a && b
    LAnd = 0x44,
    /// Logical or: pop b, pop a, push a || b
    LOr = 0x45,
    /// Logical xor: pop b, pop a, push a != b (as booleans)
    LXor = 0x46,

    // ===== Game Operations =====
    /// Actor speech (operands: u8 lineCount, u16 actor, u8 flags, u16 unused)
    Speak = 0x53,
    /// Claim the dialog panel
    DialogBegin = 0x54,
    /// Hand the dialog panel to the player and wait for a reply
    DialogEnd = 0x55,
    /// Add a reply line (operands: u8 reply, u8 flags, [u16 once-flag bit])
    Reply = 0x56,
    /// Skip an animation block (operands: u16, u16, u8 skip)
    Animate = 0x57,
}

impl Opcode {
    /// Convert a byte to an opcode
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::NextBlock),
            0x02 => Some(Self::Dup),
            0x03 => Some(Self::Drop),
            0x04 => Some(Self::Zero),
            0x05 => Some(Self::One),
            0x06 => Some(Self::ConstInt),
            0x08 => Some(Self::StrLit),
            0x0B => Some(Self::GetFlag),
            0x0C => Some(Self::GetInt),
            0x0F => Some(Self::PutFlag),
            0x10 => Some(Self::PutInt),
            0x13 => Some(Self::PutFlagV),
            0x14 => Some(Self::PutIntV),
            0x17 => Some(Self::Call),
            0x18 => Some(Self::Ccall),
            0x19 => Some(Self::CcallV),
            0x1A => Some(Self::Enter),
            0x1B => Some(Self::Return),
            0x1C => Some(Self::ReturnV),
            0x1D => Some(Self::Jmp),
            0x1E => Some(Self::JmpTrueV),
            0x1F => Some(Self::JmpFalseV),
            0x20 => Some(Self::JmpTrue),
            0x21 => Some(Self::JmpFalse),
            0x22 => Some(Self::JmpSwitch),
            0x24 => Some(Self::JmpRandom),
            0x25 => Some(Self::Negate),
            0x26 => Some(Self::Not),
            0x27 => Some(Self::Compl),
            0x28 => Some(Self::IncV),
            0x29 => Some(Self::DecV),
            0x2A => Some(Self::PostInc),
            0x2B => Some(Self::PostDec),
            0x2C => Some(Self::Add),
            0x2D => Some(Self::Sub),
            0x2E => Some(Self::Mul),
            0x2F => Some(Self::Div),
            0x30 => Some(Self::Mod),
            0x33 => Some(Self::Eq),
            0x34 => Some(Self::Ne),
            0x35 => Some(Self::Gt),
            0x36 => Some(Self::Lt),
            0x37 => Some(Self::Ge),
            0x38 => Some(Self::Le),
            0x3F => Some(Self::Rsh),
            0x40 => Some(Self::Lsh),
            0x41 => Some(Self::And),
            0x42 => Some(Self::Or),
            0x43 => Some(Self::Xor),
            0x44 => Some(Self::LAnd),
            0x45 => Some(Self::LOr),
            0x46 => Some(Self::LXor),
            0x53 => Some(Self::Speak),
            0x54 => Some(Self::DialogBegin),
            0x55 => Some(Self::DialogEnd),
            0x56 => Some(Self::Reply),
            0x57 => Some(Self::Animate),
            _ => None,
        }
    }

    /// Convert opcode to byte
    #[inline]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Get the mnemonic of this opcode
    pub fn name(self) -> &'static str {
        match self {
            Self::NextBlock => "NEXT_BLOCK",
            Self::Dup => "DUP",
            Self::Drop => "DROP",
            Self::Zero => "ZERO",
            Self::One => "ONE",
            Self::ConstInt => "CONST_INT",
            Self::StrLit => "STR_LIT",
            Self::GetFlag => "GET_FLAG",
            Self::GetInt => "GET_INT",
            Self::PutFlag => "PUT_FLAG",
            Self::PutInt => "PUT_INT",
            Self::PutFlagV => "PUT_FLAG_V",
            Self::PutIntV => "PUT_INT_V",
            Self::Call => "CALL",
            Self::Ccall => "CCALL",
            Self::CcallV => "CCALL_V",
            Self::Enter => "ENTER",
            Self::Return => "RETURN",
            Self::ReturnV => "RETURN_V",
            Self::Jmp => "JMP",
            Self::JmpTrueV => "JMP_TRUE_V",
            Self::JmpFalseV => "JMP_FALSE_V",
            Self::JmpTrue => "JMP_TRUE",
            Self::JmpFalse => "JMP_FALSE",
            Self::JmpSwitch => "JMP_SWITCH",
            Self::JmpRandom => "JMP_RANDOM",
            Self::Negate => "NEGATE",
            Self::Not => "NOT",
            Self::Compl => "COMPL",
            Self::IncV => "INC_V",
            Self::DecV => "DEC_V",
            Self::PostInc => "POST_INC",
            Self::PostDec => "POST_DEC",
            Self::Add => "ADD",
            Self::Sub => "SUB",
            Self::Mul => "MUL",
            Self::Div => "DIV",
            Self::Mod => "MOD",
            Self::Eq => "EQ",
            Self::Ne => "NE",
            Self::Gt => "GT",
            Self::Lt => "LT",
            Self::Ge => "GE",
            Self::Le => "LE",
            Self::Rsh => "RSH",
            Self::Lsh => "LSH",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Xor => "XOR",
            Self::LAnd => "LAND",
            Self::LOr => "LOR",
            Self::LXor => "LXOR",
            Self::Speak => "SPEAK",
            Self::DialogBegin => "DIALOG_BEGIN",
            Self::DialogEnd => "DIALOG_END",
            Self::Reply => "REPLY",
            Self::Animate => "ANIMATE",
        }
    }

    /// Check if this opcode is a return instruction
    pub fn is_return(self) -> bool {
        matches!(self, Self::Return | Self::ReturnV)
    }

    /// Check if control never falls through to the next instruction
    pub fn is_terminator(self) -> bool {
        self.is_return()
            || matches!(
                self,
                Self::Jmp | Self::JmpSwitch | Self::JmpRandom | Self::NextBlock
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip() {
        for byte in 0..=u8::MAX {
            if let Some(opcode) = Opcode::from_u8(byte) {
                assert_eq!(opcode.to_u8(), byte, "Failed roundtrip for {:?}", opcode);
            }
        }
    }

    #[test]
    fn test_invalid_opcode() {
        assert_eq!(Opcode::from_u8(0x00), None);
        assert_eq!(Opcode::from_u8(0x07), None);
        assert_eq!(Opcode::from_u8(0x23), None);
        assert_eq!(Opcode::from_u8(0xFF), None);
    }

    #[test]
    fn test_opcode_names() {
        assert_eq!(Opcode::Dup.name(), "DUP");
        assert_eq!(Opcode::JmpSwitch.name(), "JMP_SWITCH");
        assert_eq!(Opcode::PutFlagV.name(), "PUT_FLAG_V");
        assert_eq!(Opcode::DialogBegin.name(), "DIALOG_BEGIN");
    }

    #[test]
    fn test_return_detection() {
        assert!(Opcode::Return.is_return());
        assert!(Opcode::ReturnV.is_return());
        assert!(!Opcode::Jmp.is_return());
    }

    #[test]
    fn test_terminator_detection() {
        assert!(Opcode::Return.is_terminator());
        assert!(Opcode::Jmp.is_terminator());
        assert!(Opcode::JmpSwitch.is_terminator());
        assert!(!Opcode::JmpTrue.is_terminator());
        assert!(!Opcode::Call.is_terminator());
        assert!(!Opcode::Add.is_terminator());
    }

    #[test]
    fn test_opcode_values() {
        assert_eq!(Opcode::NextBlock as u8, 0x01);
        assert_eq!(Opcode::Call as u8, 0x17);
        assert_eq!(Opcode::Jmp as u8, 0x1D);
        assert_eq!(Opcode::Add as u8, 0x2C);
        assert_eq!(Opcode::Speak as u8, 0x53);
        assert_eq!(Opcode::Animate as u8, 0x57);
    }
}
