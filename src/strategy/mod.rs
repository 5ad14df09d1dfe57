//! Code discovery strategies

use std::fmt;
use clap::ValueEnum;
use crate::table::FrequencyTable;
use crate::{Address, AnalysisError};

/// Available code discovery strategies.
#[derive(Copy, Clone, ValueEnum, Debug, Default, PartialEq, Eq)]
pub enum Strategy {
    /// Worklist walk from the entry points; windows never cross a change of
    /// execution strand
    #[default]
    Recursive,
    /// Sweep the whole code buffer; windows never cross a basic-block start
    Linear,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Recursive => write!(f, "Recursive descent"),
            Strategy::Linear => write!(f, "Linear sweep"),
        }
    }
}

impl Strategy {
    /// Run the selected strategy over `code`, counting every discovered
    /// instruction and instruction pair into `table`.
    pub fn run(
        &self,
        code: &[u8],
        entry_points: &[Address],
        table: &mut FrequencyTable,
    ) -> Result<Walk, AnalysisError> {
        match self {
            Strategy::Recursive => recursive::run(code, entry_points, table),
            Strategy::Linear => linear::run(code, entry_points, table),
        }
    }

    /// Return all available strategies
    pub fn all() -> &'static [Strategy] {
        &[Strategy::Recursive, Strategy::Linear]
    }
}

/// Instruction starts discovered by a strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Walk {
    /// One flag per code offset, set once for every decoded instruction start
    pub visited: Vec<bool>,
    /// Number of instructions decoded and counted
    pub instructions: usize,
}

impl Walk {
    pub fn new(code_length: usize) -> Self {
        Self {
            visited: vec![false; code_length],
            instructions: 0,
        }
    }

    pub fn is_visited(&self, offset: Address) -> bool {
        self.visited.get(offset as usize).copied().unwrap_or(false)
    }

    /// Mark `offset` as an instruction start. Returns false if it already was.
    pub fn mark(&mut self, offset: Address) -> bool {
        let flag = &mut self.visited[offset as usize];
        if *flag {
            return false;
        }
        *flag = true;
        self.instructions += 1;
        true
    }

    /// Visited offsets in ascending order.
    pub fn visited_offsets(&self) -> impl Iterator<Item = Address> + '_ {
        self.visited
            .iter()
            .enumerate()
            .filter(|(_, visited)| **visited)
            .map(|(offset, _)| offset as Address)
    }
}

pub mod recursive;
pub mod linear;
