//! Data-driven instruction table and decoder for the stack-machine bytecode.
//!
//! One [`InsnDescriptor`] per opcode says how many operand bytes follow the
//! opcode, how control leaves the instruction, and whether one of its operands
//! is a static branch target.

use std::fmt;

use crate::reader::{le_u32, Reader};
use crate::{Address, Insn};

/// Errors that can occur during decoding
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Opcode byte not present in the instruction table
    #[error("unknown instruction 0x{opcode:02x} at offset {offset}")]
    UnknownOpcode { opcode: u8, offset: Address },

    /// Not enough bytes left for the declared operand length
    #[error("expected {what} at offset {offset}, got end of bytecode")]
    Truncated { what: &'static str, offset: Address },

    /// Static branch target outside the code buffer
    #[error("branch target {target} of instruction at offset {offset} is outside code of length {code_length}")]
    TargetOutOfBounds {
        target: Address,
        offset: Address,
        code_length: Address,
    },
}

/// How control leaves an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flow {
    /// Only the next instruction is reachable; the instruction may begin a
    /// two-instruction window.
    Normal,
    /// Both the next instruction and the target (if any) are reachable, but
    /// the instruction never begins a two-instruction window. Conditional
    /// jumps belong here too.
    Call,
    /// The next instruction is not reachable; only the target (if any) is.
    Stop,
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flow::Normal => write!(f, "normal"),
            Flow::Call => write!(f, "call"),
            Flow::Stop => write!(f, "stop"),
        }
    }
}

/// Operand layout following the opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operands {
    /// No operands
    None,
    /// One 32-bit operand
    Word,
    /// Two 32-bit operands
    TwoWords,
    /// Target and capture count, then `count` (designation byte, index) pairs
    Closure,
}

/// Where a static branch target is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// No static target
    None,
    /// The first 32-bit operand
    FirstOperand,
}

/// Static metadata for one opcode.
#[derive(Debug, PartialEq, Eq)]
pub struct InsnDescriptor {
    pub opcode: u8,
    pub mnemonic: &'static str,
    pub operands: Operands,
    pub flow: Flow,
    pub target: Target,
}

const fn insn(
    opcode: u8,
    mnemonic: &'static str,
    operands: Operands,
    flow: Flow,
    target: Target,
) -> InsnDescriptor {
    InsnDescriptor { opcode, mnemonic, operands, flow, target }
}

use Flow::{Call, Normal, Stop};
use Operands::{Closure, TwoWords, Word};

/// Every legal opcode, sorted by opcode value.
pub static INSTRUCTIONS: &[InsnDescriptor] = &[
    insn(0x01, "ADD", Operands::None, Normal, Target::None),
    insn(0x02, "SUB", Operands::None, Normal, Target::None),
    insn(0x03, "MUL", Operands::None, Normal, Target::None),
    insn(0x04, "DIV", Operands::None, Normal, Target::None),
    insn(0x05, "REM", Operands::None, Normal, Target::None),
    insn(0x06, "LT", Operands::None, Normal, Target::None),
    insn(0x07, "LEQ", Operands::None, Normal, Target::None),
    insn(0x08, "GT", Operands::None, Normal, Target::None),
    insn(0x09, "GEQ", Operands::None, Normal, Target::None),
    insn(0x0A, "EQ", Operands::None, Normal, Target::None),
    insn(0x0B, "NEQ", Operands::None, Normal, Target::None),
    insn(0x0C, "AND", Operands::None, Normal, Target::None),
    insn(0x0D, "OR", Operands::None, Normal, Target::None),
    insn(0x10, "CONST", Word, Normal, Target::None),
    insn(0x11, "STRING", Word, Normal, Target::None),
    insn(0x12, "SEXP", TwoWords, Normal, Target::None),
    insn(0x14, "STA", Operands::None, Normal, Target::None),
    insn(0x15, "JMP", Word, Stop, Target::FirstOperand),
    insn(0x16, "END", Operands::None, Stop, Target::None),
    insn(0x17, "RET", Operands::None, Stop, Target::None),
    insn(0x18, "DROP", Operands::None, Normal, Target::None),
    insn(0x19, "DUP", Operands::None, Normal, Target::None),
    insn(0x1A, "SWAP", Operands::None, Normal, Target::None),
    insn(0x1B, "ELEM", Operands::None, Normal, Target::None),
    insn(0x20, "LD_GLOBAL", Word, Normal, Target::None),
    insn(0x21, "LD_LOCAL", Word, Normal, Target::None),
    insn(0x22, "LD_ARG", Word, Normal, Target::None),
    insn(0x23, "LD_CAPTURE", Word, Normal, Target::None),
    insn(0x40, "ST_GLOBAL", Word, Normal, Target::None),
    insn(0x41, "ST_LOCAL", Word, Normal, Target::None),
    insn(0x42, "ST_ARG", Word, Normal, Target::None),
    insn(0x43, "ST_CAPTURE", Word, Normal, Target::None),
    insn(0x50, "CJMP_Z", Word, Call, Target::FirstOperand),
    insn(0x51, "CJMP_NZ", Word, Call, Target::FirstOperand),
    insn(0x52, "BEGIN", TwoWords, Normal, Target::None),
    insn(0x53, "BEGINC", TwoWords, Normal, Target::None),
    // Closure bodies are reachable, but construction itself falls through.
    insn(0x54, "CLOSURE", Closure, Normal, Target::FirstOperand),
    insn(0x55, "CALLC", Word, Call, Target::None),
    insn(0x56, "CALL", TwoWords, Call, Target::FirstOperand),
    insn(0x57, "TAG", TwoWords, Normal, Target::None),
    insn(0x58, "ARRAY", Word, Normal, Target::None),
    insn(0x59, "FAIL", TwoWords, Stop, Target::None),
    insn(0x5A, "LINE", Word, Normal, Target::None),
    insn(0x60, "PATTERN_STRCMP", Operands::None, Normal, Target::None),
    insn(0x61, "PATTERN_STRING", Operands::None, Normal, Target::None),
    insn(0x62, "PATTERN_ARRAY", Operands::None, Normal, Target::None),
    insn(0x63, "PATTERN_SEXP", Operands::None, Normal, Target::None),
    insn(0x64, "PATTERN_BOXED", Operands::None, Normal, Target::None),
    insn(0x65, "PATTERN_UNBOXED", Operands::None, Normal, Target::None),
    insn(0x66, "PATTERN_CLOSURE", Operands::None, Normal, Target::None),
    insn(0x70, "BUILTIN_READ", Operands::None, Normal, Target::None),
    insn(0x71, "BUILTIN_WRITE", Operands::None, Normal, Target::None),
    insn(0x72, "BUILTIN_LENGTH", Operands::None, Normal, Target::None),
    insn(0x73, "BUILTIN_STRING", Operands::None, Normal, Target::None),
    insn(0x74, "BUILTIN_ARRAY", Word, Normal, Target::None),
    insn(0xFF, "STOP", Operands::None, Normal, Target::None),
];

/// Find the descriptor for `opcode`.
pub fn lookup(opcode: u8) -> Option<&'static InsnDescriptor> {
    INSTRUCTIONS
        .binary_search_by_key(&opcode, |d| d.opcode)
        .ok()
        .map(|index| &INSTRUCTIONS[index])
}

impl InsnDescriptor {
    /// True if control may leave without reaching the next instruction.
    pub fn ends_block(&self) -> bool {
        self.flow != Flow::Normal
    }

    /// Number of operand bytes; `reader` must sit right after the opcode.
    pub fn operand_length(&self, reader: &Reader<'_>) -> Result<u32, DecodeError> {
        match self.operands {
            Operands::None => Ok(0),
            Operands::Word => Ok(4),
            Operands::TwoWords => Ok(8),
            Operands::Closure => {
                let captures = reader.peek_u32_at(4, "closure header")?;
                let length = 8 + captures as u64 * 5;
                reader.require(length, "closure captures")?;
                Ok(length as u32)
            }
        }
    }

    /// Static branch target; `reader` must sit right after the opcode.
    pub fn branch_target(&self, reader: &Reader<'_>) -> Result<Option<Address>, DecodeError> {
        match self.target {
            Target::None => Ok(None),
            Target::FirstOperand => Ok(Some(reader.peek_u32_at(0, "branch target")?)),
        }
    }
}

/// Result of decoding one instruction.
#[derive(Debug, Clone, Copy)]
pub struct Decoded {
    /// Offset of the opcode byte
    pub start: Address,
    /// Offset one past the last operand byte
    pub end: Address,
    pub descriptor: &'static InsnDescriptor,
    /// Static branch target, already bounds-checked
    pub target: Option<Address>,
}

impl Decoded {
    pub fn flow(&self) -> Flow {
        self.descriptor.flow
    }

    pub fn size(&self) -> u32 {
        self.end - self.start
    }
}

/// Decode the instruction under `reader` and advance past it. Every consumed
/// byte is folded into the reader's hashes.
pub fn decode_next(reader: &mut Reader<'_>) -> Result<Decoded, DecodeError> {
    let start = reader.position();
    let opcode = reader.next_byte("opcode")?;
    let descriptor = lookup(opcode).ok_or(DecodeError::UnknownOpcode { opcode, offset: start })?;

    let length = descriptor.operand_length(reader)?;
    let target = descriptor.branch_target(reader)?;
    if let Some(target) = target {
        if target >= reader.code_length() {
            return Err(DecodeError::TargetOutOfBounds {
                target,
                offset: start,
                code_length: reader.code_length(),
            });
        }
    }
    reader.read(length, "operands")?;

    Ok(Decoded {
        start,
        end: reader.position(),
        descriptor,
        target,
    })
}

/// Decode the instruction at `at` into a displayable [`Insn`].
pub fn disassemble(code: &[u8], at: Address) -> Result<Insn, DecodeError> {
    let mut reader = Reader::new(code, at);
    let decoded = decode_next(&mut reader)?;
    let descriptor = decoded.descriptor;
    let args = &code[decoded.start as usize + 1..decoded.end as usize];

    let operands = match descriptor.operands {
        Operands::None => Vec::new(),
        Operands::Word => vec![le_u32(args)],
        Operands::TwoWords => vec![le_u32(args), le_u32(&args[4..])],
        Operands::Closure => {
            let mut operands = vec![le_u32(args), le_u32(&args[4..])];
            for capture in args[8..].chunks_exact(5) {
                operands.push(capture[0] as u32);
                operands.push(le_u32(&capture[1..]));
            }
            operands
        }
    };

    Ok(Insn {
        addr: decoded.start,
        size: decoded.size(),
        opcode: descriptor.opcode,
        mnemonic: descriptor.mnemonic,
        operands,
    })
}
