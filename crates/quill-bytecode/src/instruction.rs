//! Decoded instructions
//!
//! The VM never interprets raw bytes directly: every instruction is decoded
//! into an [`Instruction`] with validated operands first. Decoding is also what
//! the verifier and the disassembler are built on.

use crate::encoder::{BytecodeReader, DecodeError};
use crate::opcode::Opcode;
use std::fmt;

/// Size of a code page; `NEXT_BLOCK` jumps to the start of the next one
pub const CODE_PAGE_SIZE: usize = 1024;

/// `SPEAK` flag: do not play the talk animation
pub const SPEAK_NO_ANIMATE: u8 = 0x01;
/// `SPEAK` flag: do not wait for the speech to finish
pub const SPEAK_ASYNC: u8 = 0x02;
/// `SPEAK` flag: slow text
pub const SPEAK_SLOW: u8 = 0x04;

/// `REPLY` flag: the reply is offered once, guarded by a static flag bit
pub const REPLY_ONCE: u8 = 0x01;
/// `REPLY` flag: summary reply
pub const REPLY_SUMMARY: u8 = 0x02;

/// Memory region addressed by a data-access operand
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    /// Shared globals buffer
    Common = 0,
    /// The module's statics inside the globals buffer
    Static = 1,
    /// The module's code buffer copy
    Module = 2,
    /// The current stack frame
    Stack = 3,
    /// The thread's private variables
    Thread = 4,
}

impl Region {
    /// Convert a selector byte to a region
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Common),
            1 => Some(Self::Static),
            2 => Some(Self::Module),
            3 => Some(Self::Stack),
            4 => Some(Self::Thread),
            _ => None,
        }
    }

    /// Convert region to its selector byte
    #[inline]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Lowercase region name
    pub fn name(self) -> &'static str {
        match self {
            Self::Common => "common",
            Self::Static => "static",
            Self::Module => "module",
            Self::Stack => "stack",
            Self::Thread => "thread",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A word operand: region plus signed byte offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Address {
    /// Region the offset is relative to
    pub region: Region,
    /// Byte offset from the region base
    pub offset: i16,
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.region, self.offset)
    }
}

/// A flag operand: region plus bit number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagAddress {
    /// Region the flag byte lives in
    pub region: Region,
    /// Bit number, 8 flags per byte
    pub bit: u16,
}

impl FlagAddress {
    /// Byte offset of the flag within its region
    #[inline]
    pub fn byte_offset(self) -> i32 {
        i32::from(self.bit >> 3)
    }

    /// Mask selecting the flag within its byte
    #[inline]
    pub fn mask(self) -> u8 {
        1 << (self.bit & 7)
    }
}

impl fmt::Display for FlagAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:bit{}", self.region, self.bit)
    }
}

/// Binary operators; all pop the right operand, then the left, and push `left op right`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Rsh,
    Lsh,
    And,
    Or,
    Xor,
    LAnd,
    LOr,
    LXor,
}

impl BinaryOp {
    /// Map an opcode to its binary operator
    pub fn from_opcode(opcode: Opcode) -> Option<Self> {
        Some(match opcode {
            Opcode::Add => Self::Add,
            Opcode::Sub => Self::Sub,
            Opcode::Mul => Self::Mul,
            Opcode::Div => Self::Div,
            Opcode::Mod => Self::Mod,
            Opcode::Eq => Self::Eq,
            Opcode::Ne => Self::Ne,
            Opcode::Gt => Self::Gt,
            Opcode::Lt => Self::Lt,
            Opcode::Ge => Self::Ge,
            Opcode::Le => Self::Le,
            Opcode::Rsh => Self::Rsh,
            Opcode::Lsh => Self::Lsh,
            Opcode::And => Self::And,
            Opcode::Or => Self::Or,
            Opcode::Xor => Self::Xor,
            Opcode::LAnd => Self::LAnd,
            Opcode::LOr => Self::LOr,
            Opcode::LXor => Self::LXor,
            _ => return None,
        })
    }

    /// The opcode encoding this operator
    pub fn opcode(self) -> Opcode {
        match self {
            Self::Add => Opcode::Add,
            Self::Sub => Opcode::Sub,
            Self::Mul => Opcode::Mul,
            Self::Div => Opcode::Div,
            Self::Mod => Opcode::Mod,
            Self::Eq => Opcode::Eq,
            Self::Ne => Opcode::Ne,
            Self::Gt => Opcode::Gt,
            Self::Lt => Opcode::Lt,
            Self::Ge => Opcode::Ge,
            Self::Le => Opcode::Le,
            Self::Rsh => Opcode::Rsh,
            Self::Lsh => Opcode::Lsh,
            Self::And => Opcode::And,
            Self::Or => Opcode::Or,
            Self::Xor => Opcode::Xor,
            Self::LAnd => Opcode::LAnd,
            Self::LOr => Opcode::LOr,
            Self::LXor => Opcode::LXor,
        }
    }
}

/// One `JMP_SWITCH` case
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchCase {
    /// Selector value, compared as unsigned
    pub value: u16,
    /// Code offset to jump to
    pub target: u16,
}

/// One `JMP_RANDOM` branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RandomBranch {
    /// Relative weight
    pub weight: i16,
    /// Code offset to jump to
    pub target: u16,
}

/// A decoded instruction with validated operands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Jump to the next code page
    NextBlock,
    /// Duplicate top stack word
    Dup,
    /// Discard top stack word
    Drop,
    /// Push 0
    Zero,
    /// Push 1
    One,
    /// Push a constant
    ConstInt(i16),
    /// Push a string table index
    StrLit(i16),
    /// Push a flag as 0 or 1
    GetFlag(FlagAddress),
    /// Push a word
    GetInt(Address),
    /// Store top as a flag, keep it
    PutFlag(FlagAddress),
    /// Store top as a word, keep it
    PutInt(Address),
    /// Pop and store as a flag
    PutFlagV(FlagAddress),
    /// Pop and store as a word
    PutIntV(Address),
    /// In-module call
    Call {
        /// Number of argument words already pushed
        arg_count: u8,
        /// Absolute code offset of the callee
        target: u16,
    },
    /// Host call; `discard` is set for `CCALL_V`
    Ccall {
        /// Number of argument words already pushed
        arg_count: u8,
        /// Host function index
        function: u16,
        /// Drop the host's return value
        discard: bool,
    },
    /// Open a frame with `local_bytes` of locals
    Enter(i16),
    /// Return with the popped value
    Return,
    /// Return without a value
    ReturnV,
    /// Unconditional jump
    Jmp(u16),
    /// Pop, jump if non-zero
    JmpTrueV(u16),
    /// Pop, jump if zero
    JmpFalseV(u16),
    /// Peek, jump if non-zero
    JmpTrue(u16),
    /// Peek, jump if zero
    JmpFalse(u16),
    /// Pop a selector and jump through a case table
    JmpSwitch {
        /// Cases in table order
        cases: Vec<SwitchCase>,
        /// Target when no case matches
        default: u16,
    },
    /// Weighted random branch
    JmpRandom {
        /// Sum of all weights as encoded
        total_weight: i16,
        /// Branches in table order
        branches: Vec<RandomBranch>,
    },
    /// Arithmetic negation
    Negate,
    /// Logical not
    Not,
    /// Bitwise complement
    Compl,
    /// Increment a word in place
    IncV(Address),
    /// Decrement a word in place
    DecV(Address),
    /// Push a word, then increment it
    PostInc(Address),
    /// Push a word, then decrement it
    PostDec(Address),
    /// Binary operator
    Binary(BinaryOp),
    /// Actor speech
    Speak {
        /// Number of string indices to pop
        line_count: u8,
        /// Speaking actor
        actor: u16,
        /// `SPEAK_*` flags
        flags: u8,
    },
    /// Claim the dialog panel
    DialogBegin,
    /// Hand the dialog panel to the player
    DialogEnd,
    /// Add a reply line
    Reply {
        /// Reply identifier pushed back when chosen
        reply: u8,
        /// `REPLY_*` flags
        flags: u8,
        /// Static flag bit guarding once-only replies
        once_bit: Option<u16>,
    },
    /// Animation block, skipped by the VM
    Animate {
        /// Bytes to skip from the instruction start, 0 to fall through
        skip: u8,
    },
}

impl Instruction {
    /// Decode one instruction at the reader's position
    pub fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let start = reader.position();
        let opcode = reader.read_opcode()?;

        let instruction = match opcode {
            Opcode::NextBlock => Self::NextBlock,
            Opcode::Dup => Self::Dup,
            Opcode::Drop => Self::Drop,
            Opcode::Zero => Self::Zero,
            Opcode::One => Self::One,
            Opcode::ConstInt => Self::ConstInt(reader.read_i16()?),
            Opcode::StrLit => Self::StrLit(reader.read_i16()?),

            Opcode::GetFlag => Self::GetFlag(read_flag(reader)?),
            Opcode::GetInt => Self::GetInt(read_address(reader)?),
            Opcode::PutFlag => Self::PutFlag(read_flag(reader)?),
            Opcode::PutInt => Self::PutInt(read_address(reader)?),
            Opcode::PutFlagV => Self::PutFlagV(read_flag(reader)?),
            Opcode::PutIntV => Self::PutIntV(read_address(reader)?),

            Opcode::Call => {
                let arg_count = reader.read_u8()?;
                let region_at = reader.position();
                let region = reader.read_region()?;
                if region != Region::Module {
                    return Err(DecodeError::CallOutsideModule(region.to_u8(), region_at));
                }
                Self::Call {
                    arg_count,
                    target: reader.read_u16()?,
                }
            }
            Opcode::Ccall | Opcode::CcallV => Self::Ccall {
                arg_count: reader.read_u8()?,
                function: reader.read_u16()?,
                discard: opcode == Opcode::CcallV,
            },
            Opcode::Enter => Self::Enter(reader.read_i16()?),
            Opcode::Return => Self::Return,
            Opcode::ReturnV => Self::ReturnV,

            Opcode::Jmp => Self::Jmp(reader.read_u16()?),
            Opcode::JmpTrueV => Self::JmpTrueV(reader.read_u16()?),
            Opcode::JmpFalseV => Self::JmpFalseV(reader.read_u16()?),
            Opcode::JmpTrue => Self::JmpTrue(reader.read_u16()?),
            Opcode::JmpFalse => Self::JmpFalse(reader.read_u16()?),
            Opcode::JmpSwitch => {
                let count = reader.read_i16()?;
                if count < 0 {
                    return Err(DecodeError::MalformedSwitch {
                        count,
                        offset: start,
                    });
                }
                let mut cases = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    cases.push(SwitchCase {
                        value: reader.read_u16()?,
                        target: reader.read_u16()?,
                    });
                }
                Self::JmpSwitch {
                    cases,
                    default: reader.read_u16()?,
                }
            }
            Opcode::JmpRandom => {
                let count = reader.read_u16()?;
                let total_weight = reader.read_i16()?;
                if count == 0 || total_weight <= 0 {
                    return Err(DecodeError::MalformedRandom(start));
                }
                let mut branches = Vec::with_capacity(usize::from(count));
                for _ in 0..count {
                    branches.push(RandomBranch {
                        weight: reader.read_i16()?,
                        target: reader.read_u16()?,
                    });
                }
                Self::JmpRandom {
                    total_weight,
                    branches,
                }
            }

            Opcode::Negate => Self::Negate,
            Opcode::Not => Self::Not,
            Opcode::Compl => Self::Compl,
            Opcode::IncV => Self::IncV(read_address(reader)?),
            Opcode::DecV => Self::DecV(read_address(reader)?),
            Opcode::PostInc => Self::PostInc(read_address(reader)?),
            Opcode::PostDec => Self::PostDec(read_address(reader)?),

            Opcode::Speak => {
                let line_count = reader.read_u8()?;
                let actor = reader.read_u16()?;
                let flags = reader.read_u8()?;
                let _unused = reader.read_u16()?;
                Self::Speak {
                    line_count,
                    actor,
                    flags,
                }
            }
            Opcode::DialogBegin => Self::DialogBegin,
            Opcode::DialogEnd => Self::DialogEnd,
            Opcode::Reply => {
                let reply = reader.read_u8()?;
                let flags = reader.read_u8()?;
                let once_bit = if flags & REPLY_ONCE != 0 {
                    Some(reader.read_u16()?)
                } else {
                    None
                };
                Self::Reply {
                    reply,
                    flags,
                    once_bit,
                }
            }
            Opcode::Animate => {
                let _ = reader.read_u16()?;
                let _ = reader.read_u16()?;
                Self::Animate {
                    skip: reader.read_u8()?,
                }
            }

            other => match BinaryOp::from_opcode(other) {
                Some(op) => Self::Binary(op),
                None => return Err(DecodeError::InvalidOpcode(other.to_u8(), start)),
            },
        };

        Ok(instruction)
    }

    /// The opcode this instruction was decoded from
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::NextBlock => Opcode::NextBlock,
            Self::Dup => Opcode::Dup,
            Self::Drop => Opcode::Drop,
            Self::Zero => Opcode::Zero,
            Self::One => Opcode::One,
            Self::ConstInt(_) => Opcode::ConstInt,
            Self::StrLit(_) => Opcode::StrLit,
            Self::GetFlag(_) => Opcode::GetFlag,
            Self::GetInt(_) => Opcode::GetInt,
            Self::PutFlag(_) => Opcode::PutFlag,
            Self::PutInt(_) => Opcode::PutInt,
            Self::PutFlagV(_) => Opcode::PutFlagV,
            Self::PutIntV(_) => Opcode::PutIntV,
            Self::Call { .. } => Opcode::Call,
            Self::Ccall { discard: false, .. } => Opcode::Ccall,
            Self::Ccall { discard: true, .. } => Opcode::CcallV,
            Self::Enter(_) => Opcode::Enter,
            Self::Return => Opcode::Return,
            Self::ReturnV => Opcode::ReturnV,
            Self::Jmp(_) => Opcode::Jmp,
            Self::JmpTrueV(_) => Opcode::JmpTrueV,
            Self::JmpFalseV(_) => Opcode::JmpFalseV,
            Self::JmpTrue(_) => Opcode::JmpTrue,
            Self::JmpFalse(_) => Opcode::JmpFalse,
            Self::JmpSwitch { .. } => Opcode::JmpSwitch,
            Self::JmpRandom { .. } => Opcode::JmpRandom,
            Self::Negate => Opcode::Negate,
            Self::Not => Opcode::Not,
            Self::Compl => Opcode::Compl,
            Self::IncV(_) => Opcode::IncV,
            Self::DecV(_) => Opcode::DecV,
            Self::PostInc(_) => Opcode::PostInc,
            Self::PostDec(_) => Opcode::PostDec,
            Self::Binary(op) => op.opcode(),
            Self::Speak { .. } => Opcode::Speak,
            Self::DialogBegin => Opcode::DialogBegin,
            Self::DialogEnd => Opcode::DialogEnd,
            Self::Reply { .. } => Opcode::Reply,
            Self::Animate { .. } => Opcode::Animate,
        }
    }

    /// Every code offset control may transfer to, other than falling through
    ///
    /// `start` is the offset of the instruction itself.
    pub fn branch_targets(&self, start: usize) -> Vec<usize> {
        match self {
            Self::Jmp(t)
            | Self::JmpTrueV(t)
            | Self::JmpFalseV(t)
            | Self::JmpTrue(t)
            | Self::JmpFalse(t) => vec![usize::from(*t)],
            Self::Call { target, .. } => vec![usize::from(*target)],
            Self::JmpSwitch { cases, default } => cases
                .iter()
                .map(|case| usize::from(case.target))
                .chain(std::iter::once(usize::from(*default)))
                .collect(),
            Self::JmpRandom { branches, .. } => branches
                .iter()
                .map(|branch| usize::from(branch.target))
                .collect(),
            Self::NextBlock => vec![next_page(start)],
            Self::Animate { skip } if *skip != 0 => vec![start + usize::from(*skip)],
            _ => Vec::new(),
        }
    }

    /// Whether control can continue with the following instruction
    pub fn falls_through(&self) -> bool {
        match self {
            Self::Animate { skip } => *skip == 0,
            other => !other.opcode().is_terminator(),
        }
    }
}

/// Start of the code page after the one containing `offset`
#[inline]
pub fn next_page(offset: usize) -> usize {
    CODE_PAGE_SIZE * (offset / CODE_PAGE_SIZE + 1)
}

fn read_address(reader: &mut BytecodeReader<'_>) -> Result<Address, DecodeError> {
    Ok(Address {
        region: reader.read_region()?,
        offset: reader.read_i16()?,
    })
}

fn read_flag(reader: &mut BytecodeReader<'_>) -> Result<FlagAddress, DecodeError> {
    Ok(FlagAddress {
        region: reader.read_region()?,
        bit: reader.read_u16()?,
    })
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.opcode().name();
        match self {
            Self::ConstInt(v) | Self::StrLit(v) | Self::Enter(v) => write!(f, "{} {}", name, v),
            Self::GetFlag(a) | Self::PutFlag(a) | Self::PutFlagV(a) => write!(f, "{} {}", name, a),
            Self::GetInt(a)
            | Self::PutInt(a)
            | Self::PutIntV(a)
            | Self::IncV(a)
            | Self::DecV(a)
            | Self::PostInc(a)
            | Self::PostDec(a) => write!(f, "{} {}", name, a),
            Self::Call { arg_count, target } => {
                write!(f, "{} {:#06x} ({} args)", name, target, arg_count)
            }
            Self::Ccall {
                arg_count,
                function,
                ..
            } => write!(f, "{} #{} ({} args)", name, function, arg_count),
            Self::Jmp(t)
            | Self::JmpTrueV(t)
            | Self::JmpFalseV(t)
            | Self::JmpTrue(t)
            | Self::JmpFalse(t) => write!(f, "{} {:#06x}", name, t),
            Self::JmpSwitch { cases, default } => {
                write!(f, "{} [", name)?;
                for (i, case) in cases.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{} => {:#06x}", case.value, case.target)?;
                }
                write!(f, "] default {:#06x}", default)
            }
            Self::JmpRandom {
                total_weight,
                branches,
            } => {
                write!(f, "{} /{} [", name, total_weight)?;
                for (i, branch) in branches.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{} => {:#06x}", branch.weight, branch.target)?;
                }
                f.write_str("]")
            }
            Self::Speak {
                line_count,
                actor,
                flags,
            } => write!(
                f,
                "{} actor {} ({} lines, flags {:#04x})",
                name, actor, line_count, flags
            ),
            Self::Reply {
                reply,
                flags,
                once_bit,
            } => {
                write!(f, "{} {} (flags {:#04x})", name, reply, flags)?;
                if let Some(bit) = once_bit {
                    write!(f, " once static:bit{}", bit)?;
                }
                Ok(())
            }
            Self::Animate { skip } => write!(f, "{} skip {}", name, skip),
            _ => f.write_str(name),
        }
    }
}

/// An instruction together with where it was decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    /// Offset of the opcode byte
    pub offset: usize,
    /// Offset just past the operands
    pub next: usize,
    /// The instruction itself
    pub instruction: Instruction,
}

/// Decode the instruction at `offset`
pub fn decode_at(code: &[u8], offset: usize) -> Result<Decoded, DecodeError> {
    let mut reader = BytecodeReader::at(code, offset);
    let instruction = Instruction::decode(&mut reader)?;
    Ok(Decoded {
        offset,
        next: reader.position(),
        instruction,
    })
}

/// Linear disassembly from `start` to the end of `code`
///
/// Page padding after a `NEXT_BLOCK` is skipped.
pub fn disassemble(code: &[u8], start: usize) -> Result<Vec<Decoded>, DecodeError> {
    let mut listing = Vec::new();
    let mut offset = start;
    while offset < code.len() {
        let decoded = decode_at(code, offset)?;
        offset = match decoded.instruction {
            Instruction::NextBlock => next_page(decoded.offset),
            // Animation data is not code
            Instruction::Animate { skip } if skip != 0 => decoded.offset + usize::from(skip),
            _ => decoded.next,
        };
        listing.push(decoded);
    }
    Ok(listing)
}

impl fmt::Display for Decoded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}: {}", self.offset, self.instruction)
    }
}
