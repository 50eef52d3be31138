//! Boxed text summaries for terminal output.
//!
//! Numbers are rounded for reading; the JSON output carries full precision.

use crate::composite::{ComprehensiveAnalysis, Section};
use crate::script;
use bitlens_core::TransactionSummary;
use std::fmt::Display;

const RULE_TOP: &str = "╔══════════════════════════════════════════════════════════════╗\n";
const RULE_MID: &str = "╠══════════════════════════════════════════════════════════════╣\n";
const RULE_END: &str = "╚══════════════════════════════════════════════════════════════╝\n";

fn title(out: &mut String, text: &str) {
    out.push_str(&format!("║  {text:<59} ║\n"));
}

fn row(out: &mut String, label: &str, value: impl Display) {
    out.push_str(&format!("║  {label:<20}{:>39} ║\n", value.to_string()));
}

fn opt<T: Display>(v: Option<T>) -> String {
    v.map_or_else(|| "n/a".to_string(), |v| v.to_string())
}

fn failed<T>(out: &mut String, section: &Section<T>) {
    if let Some(e) = section.error() {
        let mut msg = e.to_string();
        if msg.len() > 55 {
            let cut = (0..=55).rev().find(|i| msg.is_char_boundary(*i)).unwrap_or(0);
            msg.truncate(cut);
            msg.push('…');
        }
        out.push_str(&format!("║  FAILED: {msg:<51} ║\n"));
    }
}

/// Renders the comprehensive analysis report.
pub fn render_analysis(report: &ComprehensiveAnalysis) -> String {
    let mut out = String::new();

    out.push('\n');
    out.push_str(RULE_TOP);
    out.push_str("║                   BITLENS CHAIN ANALYSIS                    ║\n");
    out.push_str(RULE_MID);

    match &report.range {
        Section::Ok(r) => row(&mut out, "Window:", format!("{}..{} ({} blocks)", r.start, r.end, r.len())),
        Section::Failed(_) => failed(&mut out, &report.range),
    }
    if let Some(chain) = report.chain.ok() {
        row(&mut out, "Chain:", &chain.chain);
        row(&mut out, "Height:", chain.blocks);
        row(&mut out, "Sync progress:", opt(chain.verification_progress.map(|p| format!("{:.2}%", p * 100.0))));
    } else {
        failed(&mut out, &report.chain);
    }
    if let Some(net) = report.network.ok() {
        row(&mut out, "Node:", opt(net.subversion.as_deref()));
        row(&mut out, "Peers:", opt(net.connections));
    } else {
        failed(&mut out, &report.network);
    }

    out.push_str(RULE_MID);
    title(&mut out, "DIFFICULTY");
    match &report.difficulty {
        Section::Ok(d) => {
            row(&mut out, "Points:", d.series.len());
            row(&mut out, "Current:", opt(d.series.last().map(|p| format!("{:.2}", p.value.difficulty))));
            row(&mut out, "Change:", opt(d.total_change_pct.map(|c| format!("{c:+.2}%"))));
        }
        Section::Failed(_) => failed(&mut out, &report.difficulty),
    }

    out.push_str(RULE_MID);
    title(&mut out, "FEES (sat/vB)");
    match &report.fees {
        Section::Ok(f) => {
            row(&mut out, "Blocks sampled:", f.sample_count);
            row(&mut out, "Without data:", f.summary.no_data_points);
            row(&mut out, "Txs skipped:", f.summary.skipped_transactions);
            row(&mut out, "Avg mean:", opt(f.summary.avg_mean.map(|v| format!("{v:.2}"))));
            row(&mut out, "Avg median:", opt(f.summary.avg_median.map(|v| format!("{v:.2}"))));
        }
        Section::Failed(_) => failed(&mut out, &report.fees),
    }

    out.push_str(RULE_MID);
    title(&mut out, "HASHRATE");
    match &report.hashrate {
        Section::Ok(h) => {
            row(&mut out, "Estimate:", format!("{:.2} EH/s", h.exahashes_per_second));
            row(&mut out, "Sample size:", format!("{} blocks ({:?})", h.sample_size, h.confidence));
            row(&mut out, "Block spacing:", format!("{:.1} s", h.seconds_per_block));
        }
        Section::Failed(_) => failed(&mut out, &report.hashrate),
    }

    out.push_str(RULE_MID);
    title(&mut out, "BLOCK TIMES");
    match &report.block_times {
        Section::Ok(b) => {
            row(&mut out, "Intervals:", b.series.len());
            if let Some(s) = &b.statistics {
                row(&mut out, "Mean:", format!("{:.1} s", s.mean));
                row(&mut out, "Median:", format!("{:.0} s", s.median));
                row(&mut out, "Std dev:", format!("{:.1} s", s.std_dev));
            }
            row(&mut out, "Non-positive:", b.non_positive);
            row(&mut out, "Unusual:", b.unusual.len());
        }
        Section::Failed(_) => failed(&mut out, &report.block_times),
    }

    out.push_str(RULE_MID);
    title(&mut out, "MEMPOOL");
    match &report.mempool {
        Section::Ok(m) => {
            row(&mut out, "Transactions:", m.state.size);
            row(&mut out, "Bytes:", m.state.bytes);
            for est in &m.fee_estimates {
                row(
                    &mut out,
                    &format!("Next {} blocks:", est.target_blocks),
                    opt(est.sat_per_vbyte.map(|r| format!("{r:.1} sat/vB"))),
                );
            }
        }
        Section::Failed(_) => failed(&mut out, &report.mempool),
    }

    if !report.failed_sections.is_empty() {
        out.push_str(RULE_MID);
        title(&mut out, &format!("Incomplete: {}", report.failed_sections.join(", ")));
    }
    out.push_str(RULE_END);
    out
}

/// Renders one transaction summary.
pub fn render_transaction(tx: &TransactionSummary) -> String {
    let mut out = String::new();

    out.push('\n');
    out.push_str(RULE_TOP);
    title(&mut out, &format!("TX {}…", tx.txid.get(..16).unwrap_or(&tx.txid)));
    out.push_str(RULE_MID);
    row(&mut out, "Size:", format!("{} B / {} vB ({:?})", tx.size_bytes, tx.virtual_size_bytes, tx.size_class));
    row(&mut out, "Inputs:", tx.input_count);
    row(&mut out, "Outputs:", tx.output_count);
    row(&mut out, "Output total:", format!("{} sat", tx.total_output_sats));
    row(&mut out, "Fee:", opt(tx.fee_sats.map(|f| format!("{f} sat"))));
    row(&mut out, "Fee rate:", opt(tx.fee_rate_sat_per_vbyte.map(|r| format!("{r:.2} sat/vB"))));
    if tx.is_coinbase {
        row(&mut out, "Coinbase:", "yes");
    }
    out.push_str(RULE_MID);
    for (class, count) in &tx.output_script_types {
        row(&mut out, &format!("{}:", script::label(*class)), count);
    }
    let unresolved = tx.inputs.iter().filter(|i| i.unresolved.is_some()).count();
    if unresolved > 0 && !tx.is_coinbase {
        row(&mut out, "Unresolved inputs:", unresolved);
    }
    out.push_str(RULE_END);
    out
}
