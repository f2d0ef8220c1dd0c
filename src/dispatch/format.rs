use crate::config::AnalyzerConfig;
use crate::models::{CloseReason, Side, SignalCandidate, SignalOutcome};

fn side_label(side: Side) -> &'static str {
    match side {
        Side::Long => "🟢 LONG",
        Side::Short => "🔴 SHORT",
    }
}

pub fn format_signal(c: &SignalCandidate) -> String {
    let mut lines = vec![
        format!("🔥 *NEW SIGNAL* ({})", c.bot_source),
        String::new(),
        format!("*PAIR:* {}", c.symbol),
        format!("*DIRECTION:* {}", side_label(c.side)),
        format!("*ENTRY:* {:.4}", c.entry),
    ];
    for (i, tp) in c.take_profits.iter().enumerate() {
        lines.push(format!(
            "*TP{}:* {:.4} ({:+.2}%)",
            i + 1,
            tp,
            c.side.profit_pct(c.entry, *tp)
        ));
    }
    lines.push(format!(
        "*SL:* {:.4} ({:+.2}%)",
        c.stop_loss,
        c.side.profit_pct(c.entry, c.stop_loss)
    ));
    lines.push(format!("*TIMEFRAME:* {}", c.timeframe));
    lines.push(format!("*CONFIDENCE:* {:.0}%", c.confidence));
    lines.push(String::new());
    lines.push(format!(
        "⏰ {} | {}",
        c.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
        c.short_id()
    ));
    lines.join("\n")
}

/// Picks the message for a tracker outcome: partial target, final target,
/// or a non-target closure.
pub fn format_outcome(o: &SignalOutcome) -> String {
    match o.close_reason {
        None => format!(
            "🚨 *{}* Target {} of {} reached\n💸 Profit collected {:+.2}%\n⏰ Posted: {}",
            o.symbol, o.current_target_index, o.total_targets, o.profit_pct, o.duration
        ),
        Some(CloseReason::Target) => format!(
            "🏆 *Gained profit on {}*\nAll take-profit targets achieved\nProfit: {:+.2}%\nPeriod: {}",
            o.symbol, o.profit_pct, o.duration
        ),
        Some(reason) => format!(
            "📕 *{} {} closed* ({})\nTargets hit: {}/{}\nResult: {:+.2}%\nPeriod: {}",
            o.symbol,
            o.side,
            reason,
            o.current_target_index,
            o.total_targets,
            o.profit_pct,
            o.duration
        ),
    }
}

pub fn format_startup(analyzers: &[AnalyzerConfig]) -> String {
    let mut lines = vec!["🚀 *Signal engine started*".to_string(), String::new()];
    for a in analyzers {
        let mark = if a.enabled { "✅" } else { "⏸" };
        lines.push(format!(
            "{} {} ({}s, {} symbols)",
            mark,
            a.source,
            a.interval_secs,
            a.symbols.len()
        ));
    }
    lines.join("\n")
}
