//! Loader for compiled bytecode modules.
//!
//! Layout, little-endian throughout:
//!
//! ```text
//! u32 stringtab_size
//! u32 global_area_size
//! u32 public_symbols_number
//! public_symbols_number x (u32 name_offset, u32 code_offset)
//! stringtab_size bytes of string table
//! code until end of file
//! ```

use std::fmt;
use std::io::Read;
use std::path::Path;

use crate::reader::le_u32;
use crate::{Address, AnalysisError, BinaryParser};

const HEADER_SIZE: usize = 3 * 4;
const SYMBOL_SIZE: usize = 2 * 4;

/// Errors that can occur while loading a module
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    /// Fewer than 12 bytes of header
    #[error("unable to read file header: {size} bytes, expected at least {HEADER_SIZE}")]
    TruncatedHeader { size: usize },

    /// Public area larger than the file content
    #[error("file content is too small for public area: {declared} symbols need {needed} bytes, {available} available")]
    PublicAreaTooLarge {
        declared: u32,
        needed: u64,
        available: usize,
    },

    /// String table larger than what follows the public area
    #[error("file content is too small for string table: {declared} bytes declared, {available} available")]
    StringTableTooLarge { declared: u32, available: usize },

    /// A public symbol points outside the code
    #[error("public symbol {index} points to offset {offset}, outside code of length {code_length}")]
    EntryOutOfBounds {
        index: usize,
        offset: Address,
        code_length: usize,
    },
}

/// A public symbol: a named entry point into the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicSymbol {
    /// Offset of the NUL-terminated name in the string table
    pub name_offset: u32,
    /// Offset of the first instruction in the code
    pub code_offset: Address,
}

/// A loaded module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bytecode {
    /// Global area size from the header; not used by the analysis
    pub global_area_size: u32,
    public_symbols: Vec<PublicSymbol>,
    string_table: Vec<u8>,
    code: Vec<u8>,
}

impl Bytecode {
    /// Assemble a module from its sections without validation.
    pub fn from_parts(public_symbols: Vec<PublicSymbol>, string_table: Vec<u8>, code: Vec<u8>) -> Self {
        Self {
            global_area_size: 0,
            public_symbols,
            string_table,
            code,
        }
    }

    /// The code buffer.
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn public_symbols(&self) -> &[PublicSymbol] {
        &self.public_symbols
    }

    /// Code offsets of all public symbols, in declaration order.
    pub fn entry_points(&self) -> Vec<Address> {
        self.public_symbols.iter().map(|s| s.code_offset).collect()
    }

    /// Name of a public symbol, if the string table holds a valid one.
    pub fn symbol_name(&self, symbol: &PublicSymbol) -> Option<&str> {
        let tail = self.string_table.get(symbol.name_offset as usize..)?;
        let end = tail.iter().position(|&b| b == 0)?;
        std::str::from_utf8(&tail[..end]).ok()
    }
}

/// Parser for the bytecode module format.
#[derive(Debug, Default)]
pub struct ModuleParser;

impl ModuleParser {
    /// Construct a new ModuleParser.
    pub fn new() -> Self {
        ModuleParser
    }

    /// Read and parse a module from `path`.
    pub fn parse_file(&self, path: &Path) -> Result<Bytecode, AnalysisError> {
        let data = std::fs::read(path)?;
        self.parse(&data)
    }

    /// Read and parse a module from any reader, e.g. standard input.
    pub fn parse_reader<R: Read>(&self, mut input: R) -> Result<Bytecode, AnalysisError> {
        let mut data = Vec::new();
        input.read_to_end(&mut data)?;
        self.parse(&data)
    }

    fn parse_sections(&self, data: &[u8]) -> Result<Bytecode, LoadError> {
        if data.len() < HEADER_SIZE {
            return Err(LoadError::TruncatedHeader { size: data.len() });
        }
        let stringtab_size = le_u32(&data[0..]);
        let global_area_size = le_u32(&data[4..]);
        let public_symbols_number = le_u32(&data[8..]);
        let content = &data[HEADER_SIZE..];

        let public_area_size = public_symbols_number as u64 * SYMBOL_SIZE as u64;
        if (content.len() as u64) < public_area_size {
            return Err(LoadError::PublicAreaTooLarge {
                declared: public_symbols_number,
                needed: public_area_size,
                available: content.len(),
            });
        }
        let (public_area, rest) = content.split_at(public_area_size as usize);

        if rest.len() < stringtab_size as usize {
            return Err(LoadError::StringTableTooLarge {
                declared: stringtab_size,
                available: rest.len(),
            });
        }
        let (string_table, code) = rest.split_at(stringtab_size as usize);

        let public_symbols = public_area
            .chunks_exact(SYMBOL_SIZE)
            .map(|pair| PublicSymbol {
                name_offset: le_u32(pair),
                code_offset: le_u32(&pair[4..]),
            })
            .collect::<Vec<_>>();

        for (index, symbol) in public_symbols.iter().enumerate() {
            if symbol.code_offset as usize >= code.len() {
                return Err(LoadError::EntryOutOfBounds {
                    index,
                    offset: symbol.code_offset,
                    code_length: code.len(),
                });
            }
        }

        Ok(Bytecode {
            global_area_size,
            public_symbols,
            string_table: string_table.to_vec(),
            code: code.to_vec(),
        })
    }
}

impl fmt::Display for ModuleParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModuleParser")
    }
}

impl BinaryParser for ModuleParser {
    fn parse(&self, data: &[u8]) -> Result<Bytecode, AnalysisError> {
        let module = self.parse_sections(data)?;

        log::debug!(
            "Loaded module: {} bytes of code, {} public symbols, {} bytes of strings",
            module.code.len(),
            module.public_symbols.len(),
            module.string_table.len()
        );
        for symbol in &module.public_symbols {
            log::debug!(
                "  entry {} at {}",
                module.symbol_name(symbol).unwrap_or("<unnamed>"),
                symbol.code_offset
            );
        }

        Ok(module)
    }
}
