//! Linear-sweep strategy over the whole code buffer

use crate::decoder::decode_next;
use crate::reader::Reader;
use crate::table::{FrequencyTable, WindowKey};
use crate::{Address, AnalysisError};
use super::Walk;

/// Linear-sweep counting.
///
/// Decodes every instruction from offset 0 to the end of the code, whether it
/// is reachable or not. A 2-instruction window is counted for each pair of
/// consecutive instructions unless the second one starts a basic block. Block
/// starts are offset 0, the entry points, all static branch targets, and every
/// instruction following one that ends a block.
///
/// # Arguments
/// * `code` - The code buffer
/// * `entry_points` - Offsets into `code` where execution may begin
/// * `table` - Receives the window counts
///
/// # Returns
/// Every decoded instruction start
pub fn run(
    code: &[u8],
    entry_points: &[Address],
    table: &mut FrequencyTable,
) -> Result<Walk, AnalysisError> {
    log::debug!("Starting linear sweep on {} bytes", code.len());

    let block_starts = find_block_starts(code, entry_points)?;
    let mut walk = Walk::new(code.len());
    let mut reader = Reader::new(code, 0);
    let mut previous: Option<Address> = None;

    while !reader.at_end() {
        let ip = reader.position();
        walk.mark(ip);

        reader.begin_instruction();
        let insn = decode_next(&mut reader)?;

        table.mark_occurrence(code, reader.hash1(), WindowKey::new(ip, insn.end - ip))?;
        if let Some(prev_ip) = previous.filter(|_| !block_starts[ip as usize]) {
            table.mark_occurrence(code, reader.hash2(), WindowKey::new(prev_ip, insn.end - prev_ip))?;
        }
        previous = Some(ip);
    }

    log::debug!(
        "Linear sweep complete: {} instructions, {} distinct windows",
        walk.instructions,
        table.len()
    );

    Ok(walk)
}

/// First pass: mark every offset where a basic block begins.
fn find_block_starts(code: &[u8], entry_points: &[Address]) -> Result<Vec<bool>, AnalysisError> {
    let mut block_starts = vec![false; code.len()];
    if code.is_empty() {
        return Ok(block_starts);
    }

    block_starts[0] = true;
    for &entry in entry_points {
        if let Some(flag) = block_starts.get_mut(entry as usize) {
            *flag = true;
        }
    }

    let mut reader = Reader::new(code, 0);
    let mut after_block_end = false;
    while !reader.at_end() {
        let insn = decode_next(&mut reader)?;
        if after_block_end {
            block_starts[insn.start as usize] = true;
        }
        if let Some(target) = insn.target {
            block_starts[target as usize] = true;
        }
        after_block_end = insn.descriptor.ends_block();
    }

    Ok(block_starts)
}
