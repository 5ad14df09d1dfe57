#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Instant;

    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    use crate::{
        analyze,
        decoder::{disassemble, lookup, Flow, InsnDescriptor, Operands, Target, INSTRUCTIONS},
        format::OutputFormat,
        parser::{tests::build_module, ModuleParser},
        strategy::Strategy,
        table::{FrequencyTable, WindowKey},
        Address, AnalysisConfig, BinaryParser,
    };

    /// A well-formed random program: every instruction decodes, every branch
    /// target is an instruction start, closures capture nothing, and the last
    /// instruction is END.
    struct Program {
        code: Vec<u8>,
        starts: Vec<Address>,
    }

    fn encoded_size(descriptor: &InsnDescriptor) -> u32 {
        match descriptor.operands {
            Operands::None => 1,
            Operands::Word => 5,
            Operands::TwoWords | Operands::Closure => 9,
        }
    }

    fn generate(seed: u64, count: usize) -> Program {
        let mut rng = SmallRng::seed_from_u64(seed);
        let end = lookup(0x16).unwrap();

        let mut chosen: Vec<&InsnDescriptor> = (0..count.saturating_sub(1))
            .map(|_| &INSTRUCTIONS[rng.gen_range(0..INSTRUCTIONS.len())])
            .collect();
        chosen.push(end);

        let mut starts = Vec::with_capacity(chosen.len());
        let mut offset = 0;
        for descriptor in &chosen {
            starts.push(offset);
            offset += encoded_size(descriptor);
        }

        let mut code = Vec::with_capacity(offset as usize);
        for descriptor in &chosen {
            code.push(descriptor.opcode);
            let first = match descriptor.target {
                Target::FirstOperand => starts[rng.gen_range(0..starts.len())],
                // Small operands so identical windows recur.
                Target::None => rng.gen_range(0..4u32),
            };
            match descriptor.operands {
                Operands::None => {}
                Operands::Word => code.extend_from_slice(&first.to_le_bytes()),
                Operands::TwoWords => {
                    code.extend_from_slice(&first.to_le_bytes());
                    code.extend_from_slice(&rng.gen_range(0..3u32).to_le_bytes());
                }
                Operands::Closure => {
                    code.extend_from_slice(&first.to_le_bytes());
                    code.extend_from_slice(&0u32.to_le_bytes());
                }
            }
        }

        Program { code, starts }
    }

    fn pick_entries(rng: &mut SmallRng, program: &Program) -> Vec<Address> {
        let mut entries = vec![0];
        for _ in 0..rng.gen_range(0..3) {
            entries.push(program.starts[rng.gen_range(0..program.starts.len())]);
        }
        entries
    }

    fn bump(model: &mut HashMap<Vec<u8>, u32>, code: &[u8], from: Address, to: Address) {
        *model.entry(code[from as usize..to as usize].to_vec()).or_insert(0) += 1;
    }

    fn target_of(code: &[u8], at: Address) -> (Address, &'static InsnDescriptor, Option<Address>) {
        let insn = disassemble(code, at).unwrap();
        let descriptor = lookup(insn.opcode).unwrap();
        let target = match descriptor.target {
            Target::FirstOperand => Some(insn.operands[0]),
            Target::None => None,
        };
        (insn.end(), descriptor, target)
    }

    /// Straightforward model of the recursive walk, counting raw byte strings.
    fn recursive_model(code: &[u8], entries: &[Address]) -> HashMap<Vec<u8>, u32> {
        let mut model = HashMap::new();
        let mut visited = vec![false; code.len()];
        let mut worklist: Vec<Address> = entries.iter().rev().copied().collect();

        while let Some(start) = worklist.pop() {
            let mut ip = start;
            let mut previous = None;
            while (ip as usize) < code.len() && !visited[ip as usize] {
                visited[ip as usize] = true;
                let (end, descriptor, target) = target_of(code, ip);

                bump(&mut model, code, ip, end);
                if let Some(prev) = previous {
                    bump(&mut model, code, prev, end);
                }
                if let Some(target) = target.filter(|&t| !visited[t as usize]) {
                    worklist.push(target);
                }
                match descriptor.flow {
                    Flow::Normal => {
                        previous = Some(ip);
                        ip = end;
                    }
                    Flow::Call => {
                        worklist.push(end);
                        break;
                    }
                    Flow::Stop => break,
                }
            }
        }

        model
    }

    /// Model of the linear sweep: pairs never cross a block start.
    fn linear_model(code: &[u8], entries: &[Address]) -> HashMap<Vec<u8>, u32> {
        let mut starts = vec![false; code.len()];
        starts[0] = true;
        for &entry in entries {
            starts[entry as usize] = true;
        }
        let mut ip = 0;
        let mut after_stop = false;
        while (ip as usize) < code.len() {
            let (end, descriptor, target) = target_of(code, ip);
            if after_stop {
                starts[ip as usize] = true;
            }
            if let Some(target) = target {
                starts[target as usize] = true;
            }
            after_stop = descriptor.flow != Flow::Normal;
            ip = end;
        }

        let mut model = HashMap::new();
        let mut previous = None;
        let mut ip = 0;
        while (ip as usize) < code.len() {
            let (end, _, _) = target_of(code, ip);
            bump(&mut model, code, ip, end);
            if let Some(prev) = previous.filter(|_| !starts[ip as usize]) {
                bump(&mut model, code, prev, end);
            }
            previous = Some(ip);
            ip = end;
        }

        model
    }

    fn assert_matches_model(table: &FrequencyTable, code: &[u8], model: &HashMap<Vec<u8>, u32>) {
        assert_eq!(table.len(), model.len(), "distinct window count");
        for entry in table.entries() {
            let bytes = entry.key.bytes(code);
            assert_eq!(
                model.get(bytes).copied(),
                Some(entry.count),
                "window at {} of length {}",
                entry.key.offset,
                entry.key.length
            );
        }
    }

    #[test]
    fn test_recursive_matches_reference_model() {
        for seed in 1..=25 {
            let program = generate(seed, 400);
            let mut rng = SmallRng::seed_from_u64(seed * 7919);
            let entries = pick_entries(&mut rng, &program);

            let mut table = FrequencyTable::for_code_length(program.code.len());
            Strategy::Recursive.run(&program.code, &entries, &mut table).unwrap();

            let model = recursive_model(&program.code, &entries);
            assert_matches_model(&table, &program.code, &model);
        }
    }

    #[test]
    fn test_linear_matches_reference_model() {
        for seed in 1..=25 {
            let program = generate(seed, 400);
            let mut rng = SmallRng::seed_from_u64(seed * 104_729);
            let entries = pick_entries(&mut rng, &program);

            let mut table = FrequencyTable::for_code_length(program.code.len());
            let walk = Strategy::Linear.run(&program.code, &entries, &mut table).unwrap();
            assert_eq!(walk.instructions, program.starts.len());

            let model = linear_model(&program.code, &entries);
            assert_matches_model(&table, &program.code, &model);
        }
    }

    #[test]
    fn test_reachable_code_is_subset_of_sweep() {
        for seed in 100..110 {
            let program = generate(seed, 300);
            let entries = [0];

            let mut table = FrequencyTable::for_code_length(program.code.len());
            let recursive = Strategy::Recursive.run(&program.code, &entries, &mut table).unwrap();
            let mut table = FrequencyTable::for_code_length(program.code.len());
            let linear = Strategy::Linear.run(&program.code, &entries, &mut table).unwrap();

            assert!(recursive.instructions <= linear.instructions);
            for offset in recursive.visited_offsets() {
                assert!(linear.is_visited(offset), "seed {seed}: offset {offset}");
            }
        }
    }

    #[test]
    fn test_every_visited_window_is_counted() {
        let program = generate(42, 1_000);
        let mut table = FrequencyTable::for_code_length(program.code.len());
        let walk = Strategy::Recursive.run(&program.code, &[0], &mut table).unwrap();

        for offset in walk.visited_offsets() {
            let insn = disassemble(&program.code, offset).unwrap();
            let key = WindowKey::new(offset, insn.size);
            assert!(table.count_of(&program.code, key) >= 1);
        }
        let singles: u32 = table
            .entries()
            .filter(|entry| {
                disassemble(&program.code, entry.key.offset)
                    .map(|insn| insn.size == entry.key.length)
                    .unwrap_or(false)
            })
            .map(|entry| entry.count)
            .sum();
        assert_eq!(singles as usize, walk.instructions);
    }

    #[test]
    fn test_full_pipeline_is_deterministic() {
        let program = generate(7, 2_000);
        let data = build_module(&[(0, 0)], b"main\0", &program.code);
        let module = ModuleParser::new().parse(&data).unwrap();

        for strategy in Strategy::all() {
            let config = AnalysisConfig {
                threshold: 3,
                strategy: *strategy,
                capacity: None,
            };
            let first = analyze(&module, &config).unwrap();
            let second = analyze(&module, &config).unwrap();
            assert_eq!(first, second, "{strategy}");

            for pair in first.entries.windows(2) {
                assert!(
                    (pair[0].count, pair[0].offset, pair[0].length)
                        < (pair[1].count, pair[1].offset, pair[1].length)
                );
            }
            assert!(first.entries.iter().all(|entry| entry.count >= 3));

            for format in OutputFormat::available_formats() {
                let a = format.get_formatter().format(&first).unwrap();
                let b = format.get_formatter().format(&second).unwrap();
                assert_eq!(a, b, "{strategy} / {format}");
            }
        }
    }

    #[test]
    fn test_threshold_only_filters() {
        let mut rng = SmallRng::seed_from_u64(0x7E57);
        for seed in 200..215 {
            let program = generate(seed, 600);
            let module = crate::parser::Bytecode::from_parts(
                vec![crate::parser::PublicSymbol { name_offset: 0, code_offset: 0 }],
                Vec::new(),
                program.code,
            );
            let strategy = Strategy::all()[rng.gen_range(0..Strategy::all().len())];
            let threshold = rng.gen_range(0..6u32);

            let everything = analyze(&module, &AnalysisConfig { threshold: 0, strategy, capacity: None }).unwrap();
            let filtered = analyze(&module, &AnalysisConfig { threshold, strategy, capacity: None }).unwrap();

            let expected: Vec<_> = everything
                .entries
                .iter()
                .filter(|entry| entry.count >= threshold)
                .cloned()
                .collect();
            assert_eq!(filtered.entries, expected, "seed {seed}, threshold {threshold}");
        }
    }

    #[test]
    fn test_pack_preserves_counts_on_generated_tables() {
        for seed in 300..310 {
            let program = generate(seed, 500);
            let mut table = FrequencyTable::for_code_length(program.code.len());
            Strategy::Linear.run(&program.code, &[0], &mut table).unwrap();

            let mut before: Vec<_> = table.entries().copied().collect();
            let total: u32 = before.iter().map(|entry| entry.count).sum();

            let packed = table.pack();
            assert_eq!(packed, before.len());
            assert_eq!(table.pack(), packed);

            let mut after: Vec<_> = table.entries().copied().collect();
            before.sort_by_key(|entry| (entry.key.offset, entry.key.length));
            after.sort_by_key(|entry| (entry.key.offset, entry.key.length));
            assert_eq!(before, after);
            assert_eq!(after.iter().map(|entry| entry.count).sum::<u32>(), total);
        }
    }

    #[test]
    fn test_large_program() {
        let program = generate(0xDECAF, 100_000);
        println!("Generated {} bytes of code", program.code.len());

        let module = crate::parser::Bytecode::from_parts(
            vec![crate::parser::PublicSymbol { name_offset: 0, code_offset: 0 }],
            Vec::new(),
            program.code,
        );

        for strategy in Strategy::all() {
            let start = Instant::now();
            let report = analyze(&module, &AnalysisConfig { strategy: *strategy, ..AnalysisConfig::default() })
                .unwrap();
            println!("{} produced {} entries in {:?}", strategy, report.entries.len(), start.elapsed());
            assert!(!report.entries.is_empty());
        }
    }
}
