//! Recursive descent over reachable code, counting windows in a single pass

use crate::decoder::{decode_next, Flow};
use crate::reader::Reader;
use crate::table::{FrequencyTable, WindowKey};
use crate::{Address, AnalysisError};
use super::Walk;

/// Walk every instruction reachable from `entry_points` and count its
/// 1-instruction window, plus the 2-instruction window it forms with its
/// predecessor on the same strand.
///
/// A strand is a run of instructions linked by `normal` fallthrough. It ends
/// at a `stop` instruction, at a `call` instruction (whose fallthrough starts
/// a fresh strand), at the end of the code, or when it reaches an instruction
/// that is already visited. Each instruction start is decoded exactly once.
///
/// The worklist is a stack, so the walk order, and with it the pair counts
/// where strands merge, is fully determined by the input.
///
/// # Arguments
/// * `code` - The code buffer
/// * `entry_points` - Offsets into `code` where execution may begin
/// * `table` - Receives the window counts
///
/// # Returns
/// The set of visited instruction starts
pub fn run(
    code: &[u8],
    entry_points: &[Address],
    table: &mut FrequencyTable,
) -> Result<Walk, AnalysisError> {
    log::debug!(
        "Starting recursive descent over {} bytes from {} entry points",
        code.len(),
        entry_points.len()
    );

    let mut walk = Walk::new(code.len());
    // Reversed so the first entry point is walked first.
    let mut worklist: Vec<Address> = entry_points.iter().rev().copied().collect();

    while let Some(start) = worklist.pop() {
        walk_strand(code, start, table, &mut walk, &mut worklist)?;
    }

    log::debug!(
        "Recursive descent complete: {} instructions, {} distinct windows",
        walk.instructions,
        table.len()
    );

    Ok(walk)
}

fn walk_strand(
    code: &[u8],
    start: Address,
    table: &mut FrequencyTable,
    walk: &mut Walk,
    worklist: &mut Vec<Address>,
) -> Result<(), AnalysisError> {
    let mut reader = Reader::new(code, start);
    let mut previous: Option<Address> = None;

    loop {
        let ip = reader.position();
        if reader.at_end() {
            log::trace!("Strand at {} fell off the end at {}", start, ip);
            return Ok(());
        }
        if !walk.mark(ip) {
            log::trace!("Strand at {} merged into visited code at {}", start, ip);
            return Ok(());
        }

        reader.begin_instruction();
        let insn = decode_next(&mut reader)?;

        table.mark_occurrence(code, reader.hash1(), WindowKey::new(ip, insn.end - ip))?;
        if let Some(prev_ip) = previous {
            table.mark_occurrence(code, reader.hash2(), WindowKey::new(prev_ip, insn.end - prev_ip))?;
        }

        if let Some(target) = insn.target {
            if !walk.is_visited(target) {
                worklist.push(target);
            }
        }

        let flow = insn.flow();
        match flow {
            Flow::Normal => previous = Some(ip),
            Flow::Call | Flow::Stop => {
                if flow == Flow::Call {
                    worklist.push(insn.end);
                }
                log::trace!(
                    "Strand at {} ended by {} {} at {}",
                    start,
                    flow,
                    insn.descriptor.mnemonic,
                    ip
                );
                return Ok(());
            }
        }
    }
}
