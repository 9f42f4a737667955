use std::fmt::Write as _;

use crate::domain::Stage;
use crate::ledger::{Ledger, ProvenanceEntry};
use crate::lineage::DerivationGraph;

fn describe(entry: &ProvenanceEntry) -> String {
    let mut line = format!("[{}] {}", entry.stage.as_u8(), entry.filename);
    if entry.stage == Stage::TripleExtracted {
        let _ = write!(
            line,
            "  gene={} pvalue={} lfc={} matched={} unmatched={}",
            or_dash(&entry.gene_column),
            or_dash(&entry.pvalue_column),
            or_dash(&entry.lfc_column),
            entry.matched_count,
            entry.unmatched_count
        );
    } else if entry.stage == Stage::Split && !entry.suitable_reason.is_empty() {
        let verdict = if entry.suitable { "suitable" } else { "unsuitable" };
        let _ = write!(line, "  {verdict}: {}", entry.suitable_reason);
    }
    if entry.excluded {
        let _ = write!(line, "  EXCLUDED");
        if !entry.manual_reason.is_empty() {
            let _ = write!(line, " ({})", entry.manual_reason);
        }
    }
    line
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() { "-" } else { value }
}

fn render_subtree(
    graph: &DerivationGraph<'_>,
    entry: &ProvenanceEntry,
    depth: usize,
    out: &mut String,
) {
    let _ = writeln!(out, "{}{}", "  ".repeat(depth + 1), describe(entry));
    for child in graph.children(&entry.entry_id) {
        render_subtree(graph, child, depth + 1, out);
    }
}

pub fn render_report(ledger: &Ledger, generated_at: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "AKG tracking report");
    let _ = writeln!(out, "generated: {generated_at}");
    let excluded = ledger.entries().iter().filter(|e| e.excluded).count();
    let _ = writeln!(out, "entries: {} ({excluded} excluded)", ledger.len());
    for stage in Stage::ALL {
        let count = ledger
            .entries()
            .iter()
            .filter(|entry| entry.stage == stage)
            .count();
        let _ = writeln!(out, "  {stage}: {count}");
    }
    let (matched, unmatched) = ledger
        .entries()
        .iter()
        .filter(|entry| entry.stage == Stage::TripleExtracted)
        .fold((0, 0), |(m, u), entry| {
            (m + entry.matched_count, u + entry.unmatched_count)
        });
    let _ = writeln!(out, "genes matched: {matched}, unmatched: {unmatched}");

    let graph = ledger.derivation();
    for (source_id, roots) in graph.roots_by_source() {
        let _ = writeln!(out);
        let _ = writeln!(out, "source {source_id}");
        for root in roots {
            render_subtree(&graph, root, 0, &mut out);
        }
    }
    out
}
