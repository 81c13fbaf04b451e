use std::fmt::Write as _;

use super::format::{format_bytes, format_duration, format_ms, format_rate};

pub(crate) fn render(summary: &rampload_core::RunSummary) -> String {
    let mut out = String::new();

    if summary.scenarios.is_empty() {
        out.push_str("summary: no scenarios\n");
        return out;
    }

    out.push_str("summary\n");

    for s in &summary.scenarios {
        writeln!(out, "scenario: {} ({})", s.name, s.executor).ok();
        writeln!(
            out,
            "  requests: {} (failed {})",
            s.requests_total, s.failed_requests_total
        )
        .ok();
        if s.dropped_iterations_total > 0 {
            writeln!(
                out,
                "  iterations: {} (dropped {})",
                s.iterations_total, s.dropped_iterations_total
            )
            .ok();
        } else {
            writeln!(out, "  iterations: {}", s.iterations_total).ok();
        }
        writeln!(
            out,
            "  bytes: recv {} sent {}",
            format_bytes(s.bytes_received_total),
            format_bytes(s.bytes_sent_total)
        )
        .ok();
        writeln!(
            out,
            "  req/s: avg={} max={} overall={}",
            format_rate(s.req_per_sec_avg),
            format_rate(s.req_per_sec_max),
            format_rate(s.rps)
        )
        .ok();

        if !s.status_counts.is_empty() {
            let codes = s
                .status_counts
                .iter()
                .map(|(code, n)| format!("{code}={n}"))
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(out, "  status: {codes}").ok();
        }

        // Most frequent first.
        let mut errors: Vec<_> = s.transport_errors.iter().collect();
        errors.sort_by(|(a_kind, a), (b_kind, b)| b.cmp(a).then_with(|| a_kind.cmp(b_kind)));
        for (kind, count) in errors {
            writeln!(out, "  transport_error {kind}: {count}").ok();
        }

        render_latency(&mut out, "latency", s.latency.as_ref());
        render_latency(&mut out, "iteration_duration", s.iteration_duration.as_ref());

        out.push('\n');
    }

    out.push_str("totals\n");
    writeln!(
        out,
        "  requests: {} (failed {})",
        summary.requests_total(),
        summary.failed_requests_total()
    )
    .ok();
    writeln!(
        out,
        "  iterations: {} (dropped {})",
        summary.iterations_total(),
        summary.dropped_iterations_total()
    )
    .ok();
    writeln!(
        out,
        "  bytes: recv {} sent {}",
        format_bytes(summary.bytes_received_total()),
        format_bytes(summary.bytes_sent_total())
    )
    .ok();

    let secs = summary.run_duration.as_secs_f64().max(1e-9);
    let rps = (summary.requests_total() as f64) / secs;
    let throughput = summary
        .bytes_received_total()
        .saturating_add(summary.bytes_sent_total());
    writeln!(
        out,
        "  rates: rps={} tps={}/s over {}",
        format_rate(rps),
        format_bytes(((throughput as f64) / secs).round() as u64),
        format_duration(summary.run_duration)
    )
    .ok();

    out
}

fn render_latency(out: &mut String, label: &str, l: Option<&rampload_core::LatencySummary>) {
    match l {
        Some(l) => {
            writeln!(
                out,
                "  {label} = p50={} p90={} p95={} p99={} mean={} max={} (n={})",
                format_ms(l.p50_ms),
                format_ms(l.p90_ms),
                format_ms(l.p95_ms),
                format_ms(l.p99_ms),
                format_ms(l.mean_ms),
                format_ms(l.max_ms),
                l.count
            )
            .ok();
        }
        None => {
            writeln!(out, "  {label}: n/a").ok();
        }
    }
}
