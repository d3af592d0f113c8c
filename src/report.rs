//! Report rendering (text, JSON, CSV)

use crate::join::CallRecord;
use crate::manifest::CallableDescriptor;
use crate::pipeline::{CpuPackets, Diagnostics};
use crate::stats::SummaryRow;
use serde::Serialize;

/// Escape CSV field (handle commas, quotes, newlines)
fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn optional_hex(value: Option<u64>) -> String {
    value.map(|v| format!("{:#x}", v)).unwrap_or_default()
}

/// Aggregate report as CSV
pub fn summary_csv(rows: &[SummaryRow]) -> String {
    let mut output = String::from(
        "symbol,width,height,count,\
         latency_min_ms,latency_mean_ms,latency_max_ms,\
         throughput_min,throughput_mean,throughput_max\n",
    );
    for row in rows {
        output.push_str(&format!(
            "{},{},{},{},{},{},{},{},{},{}\n",
            escape_field(&row.symbol),
            row.width,
            row.height,
            row.count,
            row.latency_min,
            row.latency_mean,
            row.latency_max,
            row.throughput_min,
            row.throughput_mean,
            row.throughput_max
        ));
    }
    output
}

/// Aggregate report as an aligned table
pub fn summary_text(rows: &[SummaryRow]) -> String {
    if rows.is_empty() {
        return "No shaped calls found.\n".to_string();
    }

    let symbol_width = rows.iter().map(|r| r.symbol.len()).max().unwrap_or(0).max("symbol".len());
    let mut output = String::new();
    output.push_str(&format!(
        "{:<sw$} {:>11} {:>7} | {:>10} {:>10} {:>10} | {:>10} {:>10} {:>10}\n",
        "symbol",
        "shape",
        "count",
        "lat min",
        "lat mean",
        "lat max",
        "fps min",
        "fps mean",
        "fps max",
        sw = symbol_width
    ));
    output.push_str(&format!("{}\n", "─".repeat(symbol_width + 98)));
    for row in rows {
        output.push_str(&format!(
            "{:<sw$} {:>11} {:>7} | {:>10.2} {:>10.2} {:>10.2} | {:>10.2} {:>10.2} {:>10.2}\n",
            row.symbol,
            format!("{}x{}", row.width, row.height),
            row.count,
            row.latency_min,
            row.latency_mean,
            row.latency_max,
            row.throughput_min,
            row.throughput_mean,
            row.throughput_max,
            sw = symbol_width
        ));
    }
    output.push_str("(latency in ms, throughput in calls/s)\n");
    output
}

/// Call records as CSV
pub fn records_csv(records: &[CallRecord]) -> String {
    let mut output = String::from(
        "entry,exit,pid,tid,hash,symbol,return_type,\
         arg_num,arg_type,width,height,pointer,delta\n",
    );
    for r in records {
        output.push_str(&format!(
            "{},{},{},{},{},{},{},{},{},{},{},{},{}\n",
            r.entry,
            r.exit,
            r.pid,
            r.tid,
            escape_field(&r.hash),
            escape_field(&r.symbol),
            escape_field(&r.return_type),
            r.arg_num,
            escape_field(&r.arg_type),
            r.width,
            r.height,
            optional_hex(r.pointer),
            r.delta
        ));
    }
    output
}

/// Call records, one line each
pub fn records_text(records: &[CallRecord]) -> String {
    let mut output = String::new();
    for r in records {
        output.push_str(&format!(
            "[{}:{}] {} arg{} {}x{} {} ({} → {}) delta={}\n",
            r.pid,
            r.tid,
            r.symbol,
            r.arg_num,
            r.width,
            r.height,
            optional_hex(r.pointer),
            r.entry,
            r.exit,
            r.delta
        ));
    }
    output
}

fn arg_signature(c: &CallableDescriptor) -> Vec<String> {
    c.arg_list
        .iter()
        .map(|a| format!("{}:{}", a.arg_num, a.arg_type))
        .collect()
}

/// Traced call sites, one line each
pub fn callables_text(callables: &[CallableDescriptor]) -> String {
    let mut output = String::new();
    for c in callables {
        output.push_str(&format!(
            "{} {} {}({})\n",
            c.hash,
            c.return_type,
            c.symbol(),
            arg_signature(c).join(", ")
        ));
    }
    output
}

/// Traced call sites as CSV
pub fn callables_csv(callables: &[CallableDescriptor]) -> String {
    let mut output = String::from("hash,symbol,return_type,args\n");
    for c in callables {
        let args = arg_signature(c);
        output.push_str(&format!(
            "{},{},{},{}\n",
            escape_field(&c.hash),
            escape_field(&c.symbol()),
            escape_field(&c.return_type),
            escape_field(&args.join(";"))
        ));
    }
    output
}

/// Human-readable exclusion counts (stderr footer of the text report)
pub fn diagnostics_text(diag: &Diagnostics, cpus: &[CpuPackets]) -> String {
    let mut output = format!(
        "{} events, {} instrumentation events, {} calls, {} records\n",
        diag.events_total, diag.instrumentation_events, diag.completed_calls, diag.call_records
    );
    let excluded = [
        ("unparsed event names", diag.unparsed_names),
        ("events from other providers", diag.provider_filtered),
        ("calls in flight at capture end", diag.unmatched_entries),
        ("calls missing from the manifest", diag.unresolved_calls),
        ("arguments without a shape", diag.unshaped_arguments),
    ];
    for (label, count) in excluded {
        if count > 0 {
            output.push_str(&format!("  excluded: {} {}\n", count, label));
        }
    }
    if diag.negative_deltas > 0 {
        output.push_str(&format!(
            "  ⚠️  {} calls have a negative counter delta\n",
            diag.negative_deltas
        ));
    }
    for cpu in cpus.iter().filter(|c| c.events_discarded > 0) {
        output.push_str(&format!(
            "  ⚠️  cpu {} discarded {} events across {} packets\n",
            cpu.cpu_id, cpu.events_discarded, cpu.packets
        ));
    }
    output
}

/// Wrapper for the JSON form of the aggregate report
#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    pub summary: &'a [SummaryRow],
    pub diagnostics: &'a Diagnostics,
    pub packets: &'a [CpuPackets],
}
