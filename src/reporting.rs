use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use tracing::info;

use crate::tracker::DailyStats;

/// Daily performance report over the signals closed on one UTC date.
#[derive(Debug, Clone)]
pub struct DailyReport {
    pub stats: DailyStats,
}

impl DailyReport {
    pub fn new(stats: DailyStats) -> Self {
        Self { stats }
    }

    pub fn is_empty(&self) -> bool {
        self.stats.total_signals == 0
    }

    fn grade(&self) -> &'static str {
        match self.stats.win_rate {
            w if w >= 70.0 => "🔥",
            w if w >= 60.0 => "✅",
            w if w >= 50.0 => "⚡",
            _ => "⚠️",
        }
    }

    /// Telegram (Markdown) rendering.
    pub fn render(&self) -> String {
        let s = &self.stats;
        let grade = self.grade();
        let mut lines = vec![
            format!("{grade} *DAILY SIGNAL REPORT* {grade}"),
            format!("📅 *Date:* {}", s.date.format("%Y-%m-%d")),
            String::new(),
            "*📊 OVERVIEW*".to_string(),
            format!("• Total Signals: {}", s.total_signals),
            format!("• Take-Profit Hits: {} 🎯", s.tp_count),
            format!("• Stop-Loss Hits: {} 🛑", s.sl_count),
            format!("• Cancelled: {}", s.cancel_count),
            format!("• Reversed: {}", s.reversal_count),
            format!("• Timed Out: {}", s.timeout_count),
            String::new(),
            "*💰 PERFORMANCE*".to_string(),
            format!("• Win Rate: {:.1}%", s.win_rate),
            format!("• Winners: {} / Losers: {}", s.winners, s.losers),
            format!("• Avg Profit: {:+.2}%", s.avg_profit),
            format!("• Best Trade: {:+.2}%", s.best_trade),
            format!("• Worst Trade: {:+.2}%", s.worst_trade),
            format!("• Avg Duration: {} minutes", s.avg_duration_minutes),
        ];

        if !s.targets_reached.is_empty() {
            lines.push(String::new());
            lines.push("*🎯 TARGETS REACHED*".to_string());
            for (targets, count) in &s.targets_reached {
                lines.push(format!("• {targets} TP: {count} signal(s)"));
            }
        }
        lines.join("\n")
    }

    pub fn log_summary(&self) {
        let s = &self.stats;
        info!("{}", "=".repeat(50));
        info!("  DAILY REPORT {}", s.date.format("%Y-%m-%d"));
        info!("{}", "=".repeat(50));
        info!(
            "  Closed: {} | TP {} | SL {} | CANCEL {} | REVERSAL {} | TIMEOUT {}",
            s.total_signals,
            s.tp_count,
            s.sl_count,
            s.cancel_count,
            s.reversal_count,
            s.timeout_count
        );
        info!(
            "  Win rate {:.1}% | Avg {:+.2}% | Best {:+.2}% | Worst {:+.2}%",
            s.win_rate, s.avg_profit, s.best_trade, s.worst_trade
        );
        info!("  Avg duration: {} min", s.avg_duration_minutes);
        info!("{}", "=".repeat(50));
    }
}

pub fn yesterday(now: DateTime<Utc>) -> NaiveDate {
    (now - Duration::days(1)).date_naive()
}

/// Next instant strictly after `now` at `hour`:00 UTC.
pub fn next_report_at(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let hour = hour.min(23);
    let today = now.date_naive();
    let candidate = today
        .and_hms_opt(hour, 0, 0)
        .map(|t| Utc.from_utc_datetime(&t))
        .unwrap_or(now);
    if candidate > now {
        candidate
    } else {
        candidate + Duration::days(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::base_time;

    fn stats(win_rate: f64) -> DailyStats {
        let mut s = DailyStats::empty(NaiveDate::from_ymd_opt(2024, 1, 14).unwrap());
        s.total_signals = 4;
        s.tp_count = 3;
        s.sl_count = 1;
        s.winners = 3;
        s.losers = 1;
        s.win_rate = win_rate;
        s.avg_profit = 1.25;
        s.best_trade = 5.0;
        s.worst_trade = -2.0;
        s.avg_duration_minutes = 95;
        s.targets_reached.insert(5, 3);
        s.targets_reached.insert(0, 1);
        s
    }

    #[test]
    fn render_includes_sections() {
        let report = DailyReport::new(stats(75.0));
        let text = report.render();
        assert!(text.starts_with("🔥"));
        assert!(text.contains("2024-01-14"));
        assert!(text.contains("Take-Profit Hits: 3"));
        assert!(text.contains("Win Rate: 75.0%"));
        assert!(text.contains("Avg Profit: +1.25%"));
        assert!(text.contains("Worst Trade: -2.00%"));
        assert!(text.contains("5 TP: 3 signal(s)"));
        assert!(!report.is_empty());
    }

    #[test]
    fn grade_follows_win_rate() {
        assert!(DailyReport::new(stats(40.0)).render().starts_with("⚠️"));
        assert!(DailyReport::new(stats(55.0)).render().starts_with("⚡"));
        assert!(DailyReport::new(stats(65.0)).render().starts_with("✅"));
    }

    #[test]
    fn report_schedule() {
        let now = base_time(); // 2024-01-15 12:00
        assert_eq!(yesterday(now), NaiveDate::from_ymd_opt(2024, 1, 14).unwrap());
        assert_eq!(
            next_report_at(now, 0).to_rfc3339(),
            "2024-01-16T00:00:00+00:00"
        );
        assert_eq!(
            next_report_at(now, 18).to_rfc3339(),
            "2024-01-15T18:00:00+00:00"
        );
        assert_eq!(
            next_report_at(now, 12).to_rfc3339(),
            "2024-01-16T12:00:00+00:00"
        );
    }
}
