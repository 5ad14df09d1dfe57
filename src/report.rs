//! Frequency report: packs, sorts and thresholds the table, then re-decodes
//! each surviving window for display.

use std::fmt;

use serde::Serialize;

use crate::decoder::disassemble;
use crate::table::{FrequencyEntry, FrequencyTable};
use crate::{Address, AnalysisError, Insn};

/// One reported window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    pub count: u32,
    /// Offset of the first occurrence
    pub offset: Address,
    /// Window length in bytes
    pub length: u32,
    /// The one or two instructions making up the window
    pub insns: Vec<Insn>,
}

impl ReportEntry {
    /// Instructions rendered as `MNEMONIC operand...`, space separated.
    pub fn sequence(&self) -> String {
        self.insns
            .iter()
            .map(Insn::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for ReportEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x {}", self.count, self.sequence())
    }
}

/// Serializable view of an entry for structured output.
#[derive(Debug, Serialize)]
pub struct ReportRecord {
    pub count: u32,
    pub offset: Address,
    pub length: u32,
    pub sequence: String,
    pub instructions: Vec<String>,
}

impl From<&ReportEntry> for ReportRecord {
    fn from(entry: &ReportEntry) -> Self {
        Self {
            count: entry.count,
            offset: entry.offset,
            length: entry.length,
            sequence: entry.sequence(),
            instructions: entry.insns.iter().map(Insn::to_string).collect(),
        }
    }
}

/// Report entries in ascending order of count; the most frequent come last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    pub entries: Vec<ReportEntry>,
}

/// Build the report from the final table state.
///
/// Entries with `count < threshold` are dropped. Survivors are ordered by
/// ascending count, ties broken by ascending offset and then length.
pub fn report(
    table: &mut FrequencyTable,
    code: &[u8],
    threshold: u32,
) -> Result<Report, AnalysisError> {
    let mut packed: Vec<FrequencyEntry> = table.packed().iter().flatten().copied().collect();
    packed.sort_by_key(|entry| (entry.count, entry.key.offset, entry.key.length));

    let entries = packed
        .iter()
        .filter(|entry| entry.count >= threshold)
        .map(|entry| render(entry, code))
        .collect::<Result<Vec<_>, _>>()?;

    log::debug!(
        "Reporting {} of {} entries at threshold {}",
        entries.len(),
        packed.len(),
        threshold
    );

    Ok(Report { entries })
}

fn render(entry: &FrequencyEntry, code: &[u8]) -> Result<ReportEntry, AnalysisError> {
    let end = entry.key.offset + entry.key.length;
    let mut insns = Vec::new();
    let mut at = entry.key.offset;
    while at < end {
        let insn = disassemble(code, at)?;
        at = insn.end();
        insns.push(insn);
    }

    Ok(ReportEntry {
        count: entry.count,
        offset: entry.key.offset,
        length: entry.key.length,
        insns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::recursive;

    fn analyzed(code: &[u8]) -> FrequencyTable {
        let mut table = FrequencyTable::with_capacity(128);
        recursive::run(code, &[0], &mut table).unwrap();
        table
    }

    #[test]
    fn test_threshold_two_keeps_only_add() {
        let code = [0x01, 0x01, 0x16];
        let mut table = analyzed(&code);

        let report = report(&mut table, &code, 2).unwrap();
        let lines: Vec<String> = report.entries.iter().map(ToString::to_string).collect();
        assert_eq!(lines, vec!["2 x ADD"]);
    }

    #[test]
    fn test_ascending_with_offset_tiebreak() {
        let code = [0x01, 0x01, 0x16];
        let mut table = analyzed(&code);

        let report = report(&mut table, &code, 1).unwrap();
        let lines: Vec<String> = report.entries.iter().map(ToString::to_string).collect();
        assert_eq!(
            lines,
            vec!["1 x ADD ADD", "1 x ADD END", "1 x END", "2 x ADD"]
        );
    }

    #[test]
    fn test_zero_and_one_threshold_report_everything() {
        let code = [0x10, 7, 0, 0, 0, 0x10, 7, 0, 0, 0, 0x17];
        let mut table = analyzed(&code);
        let all = report(&mut table, &code, 0).unwrap();
        let mut table = analyzed(&code);
        let one = report(&mut table, &code, 1).unwrap();

        assert_eq!(all, one);
        assert_eq!(all.entries.len(), table.len());
    }

    #[test]
    fn test_threshold_never_undercuts() {
        let code = [0x18, 0x18, 0x18, 0x19, 0x16];
        for threshold in 0..5 {
            let mut table = analyzed(&code);
            let report = report(&mut table, &code, threshold).unwrap();
            assert!(report.entries.iter().all(|entry| entry.count >= threshold));
        }
    }

    #[test]
    fn test_operands_in_sequence() {
        let code = [0x21, 2, 0, 0, 0, 0x15, 0, 0, 0, 0];
        let mut table = analyzed(&code);
        let report = report(&mut table, &code, 1).unwrap();

        let pair = report.entries.iter().find(|e| e.insns.len() == 2).unwrap();
        assert_eq!(pair.to_string(), "1 x LD_LOCAL 2 JMP 0");
        assert_eq!(pair.offset, 0);
        assert_eq!(pair.length, 10);

        let record = ReportRecord::from(pair);
        assert_eq!(record.instructions, vec!["LD_LOCAL 2", "JMP 0"]);
        assert_eq!(record.sequence, "LD_LOCAL 2 JMP 0");
    }
}
