use std::time::Duration;

use crate::simulate::SimulationReport;

pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.0}m {:.0}s", (secs / 60.0).floor(), secs % 60.0)
    }
}

fn rate(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 { count as f64 / secs } else { 0.0 }
}

/// Human readable summary of a simulation run.
pub fn format_report_readable(report: &SimulationReport) -> String {
    let t = &report.tracker;
    let s = &report.sweeper;
    let mut output = String::new();

    output.push_str(&format!("# Run {}\n\n", report.run_id));
    output.push_str(&format!(
        "**Elapsed:** {} | **Produced:** {} events ({:.0}/s)\n\n",
        format_duration(report.elapsed),
        report.produced,
        rate(report.produced, report.elapsed)
    ));

    output.push_str("## Tracker\n\n");
    output.push_str(&format!("• accepted: {}\n", t.accepted));
    output.push_str(&format!("• dropped (queue full): {}\n", t.dropped));
    output.push_str(&format!(
        "• flushed: {} events in {} batches\n",
        t.flushed_events, t.flushes
    ));
    output.push_str(&format!(
        "• failed flushes: {} ({} events discarded)\n",
        t.failed_flushes, t.discarded_events
    ));
    output.push_str(&format!(
        "• liveness: {} failures, {} misses\n\n",
        t.liveness_failures, t.liveness_misses
    ));

    output.push_str("## Sweeper\n\n");
    output.push_str(&format!(
        "• passes: {} started, {} skipped, {} failed\n",
        s.passes_started, s.passes_skipped, s.passes_failed
    ));
    output.push_str(&format!("• sessions closed: {}\n\n", s.sessions_closed));

    output.push_str("## Store\n\n");
    output.push_str(&format!(
        "• sessions: {} active of {} seeded\n",
        report.active_sessions, report.seeded_sessions
    ));
    output.push_str(&format!("• events stored: {}\n", report.stored_events));

    output
}
