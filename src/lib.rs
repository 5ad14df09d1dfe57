//! Core types, configuration, and the analysis pipeline for the `insnfreq`
//! bytecode analyzer.
//!
//! The analyzer discovers every instruction reachable from the entry points of
//! a compiled stack-machine module and counts how often each byte-identical
//! instruction, and each byte-identical pair of adjacent instructions, occurs.
//! The most frequent sequences are candidates for superinstructions.
//!
//! # Basic Usage
//!
//! ```rust,no_run
//! use insnfreq::{
//!     analyze,
//!     parser::ModuleParser,
//!     format::OutputFormat,
//!     AnalysisConfig,
//!     BinaryParser, // Import the trait to bring parse() method into scope
//! };
//!
//! // Read the compiled module
//! let data = std::fs::read("path/to/module.bc").unwrap();
//! let module = ModuleParser::new().parse(&data).unwrap();
//!
//! // Walk reachable code and collect the report
//! let config = AnalysisConfig { threshold: 10, ..AnalysisConfig::default() };
//! let report = analyze(&module, &config).unwrap();
//!
//! // Render it the way the CLI does
//! let text = OutputFormat::Text.get_formatter().format(&report).unwrap();
//! print!("{}", text);
//! ```

pub mod parser;
pub mod decoder;
pub mod reader;
pub mod table;
pub mod strategy;
pub mod report;
pub mod format;
mod large_tests;

/// Byte offset into the code buffer.
pub type Address = u32;

use std::fmt;

use crate::decoder::DecodeError;
use crate::parser::{Bytecode, LoadError};
use crate::report::Report;
use crate::strategy::Strategy;
use crate::table::FrequencyTable;

/// One decoded instruction, ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insn {
    /// Offset of the opcode byte
    pub addr: Address,
    /// Size of the instruction in bytes, opcode included
    pub size: u32,
    /// Opcode byte
    pub opcode: u8,
    /// Instruction mnemonic (e.g., "CONST", "LD_LOCAL")
    pub mnemonic: &'static str,
    /// Decoded operand values, in encoding order
    pub operands: Vec<u32>,
}

impl Insn {
    /// Offset one past the last byte of this instruction.
    pub fn end(&self) -> Address {
        self.addr + self.size
    }

    /// Returns the raw encoding of this instruction from `code`.
    pub fn bytes<'a>(&self, code: &'a [u8]) -> &'a [u8] {
        &code[self.addr as usize..self.end() as usize]
    }
}

impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic)?;
        for operand in &self.operands {
            write!(f, " {}", operand)?;
        }
        Ok(())
    }
}

/// Parser trait: turn raw file bytes into a loaded module.
pub trait BinaryParser {
    /// Parse module data
    ///
    /// # Arguments
    /// * `data` - The complete contents of the module file
    ///
    /// # Returns
    /// The loaded module, or a load error naming the missing section
    fn parse(&self, data: &[u8]) -> Result<Bytecode, AnalysisError>;
}

/// Knobs for one analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisConfig {
    /// Entries with a lower count are left out of the report
    pub threshold: u32,
    /// How executable code is discovered
    pub strategy: Strategy,
    /// Frequency table capacity; derived from the code length when `None`
    pub capacity: Option<usize>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            threshold: 1,
            strategy: Strategy::default(),
            capacity: None,
        }
    }
}

/// Error type for analysis operations
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// The module file is malformed
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Reachable code could not be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The frequency table ran out of free slots
    #[error("Frequency table is full ({capacity} slots)")]
    TableFull { capacity: usize },

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Report serialization failed
    #[error("Format error: {0}")]
    Format(String),
}

/// Run the whole analysis on a loaded module: discover code with the
/// configured strategy, then build the thresholded report.
pub fn analyze(module: &Bytecode, config: &AnalysisConfig) -> Result<Report, AnalysisError> {
    let code = module.code();
    let entries = module.entry_points();

    let mut table = match config.capacity {
        Some(capacity) => FrequencyTable::with_capacity(capacity),
        None => FrequencyTable::for_code_length(code.len()),
    };

    log::debug!(
        "Analyzing {} bytes of code from {} entry points ({} strategy, {} table slots)",
        code.len(),
        entries.len(),
        config.strategy,
        table.capacity()
    );

    let walk = config.strategy.run(code, &entries, &mut table)?;
    let distinct = table.len();
    let report = report::report(&mut table, code, config.threshold)?;

    log::info!(
        "Visited {} instructions, {} distinct windows, {} reported at threshold {}",
        walk.instructions,
        distinct,
        report.entries.len(),
        config.threshold
    );

    Ok(report)
}
