// ==============================================================================
// pivot_join_example.rs - Example of Pivot Join Usage
// ==============================================================================
// Description: Joins two callers' tables for one sample and prints the result
// Author: Matthew Barham
// Created: 2025-11-19
// Modified: 2025-11-19
// Version: 1.0.0
// ==============================================================================

use variant_merge::merge::{Merge, MergeConfig, MergeStrategy, StrategyKind};
use variant_merge::output::{render_table, MemorySink};
use variant_merge::InputSource;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Pivot Join Example ===\n");

    let sources = vec![
        InputSource::new(
            "S1_gatk",
            "CHROM\tPOS\tREF\tALT\tQUAL\tDP\n1\t100\tA\tT\t50\t12\n1\t200\tA\tT\t40\t9\n",
        ),
        InputSource::new(
            "S1_strelka",
            "CHROM\tPOS\tREF\tALT\tQUAL\tDP\n1\t100\tA\tT\t20\t7\n",
        ),
    ];

    let mut strategy = MergeStrategy::select(StrategyKind::PivotJoin, sources, &MergeConfig::default())?;
    strategy.process()?;
    strategy.save()?;

    for table in strategy.outputs()? {
        println!("--- {} ---", table.file_name);
        print!("{}", String::from_utf8(render_table(table)?)?);
    }

    let mut sink = MemorySink::default();
    let artifact = strategy.emit(&mut sink)?;
    println!(
        "\n✓ Emitted {} ({}, {} bytes)",
        artifact.file_name,
        artifact.kind.mime_type(),
        artifact.bytes.len()
    );

    Ok(())
}
