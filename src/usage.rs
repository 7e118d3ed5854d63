//! Structured per-sheet usage reporting, run from `end_sheet`.
//!
//! The original reports screen memory usage through an event
//! (`SWevt_HT_USAGE`-equivalent); this crate leaves the transport to a
//! collaborator trait instead, the way the teacher hands rendered
//! frames to `Thundr` through a small trait rather than hard-coding a
//! presentation backend.

use crate::cache::ScreenCache;
use crate::types::EraseNr;

/// One screen's contribution to a sheet's usage report.
#[derive(Debug, Clone, Copy)]
pub struct ScreenUsage {
    pub screen: crate::types::ScreenId,
    pub levels_used: u32,
    pub number_cached: u32,
}

impl ScreenUsage {
    /// Percentage of requested levels that were actually backed by a
    /// real, cached form.
    pub fn percent_satisfied(&self) -> f32 {
        if self.levels_used == 0 {
            100.0
        } else {
            100.0 * self.number_cached as f32 / self.levels_used as f32
        }
    }
}

/// Receives a sheet's usage figures. Implementations might log them,
/// forward them as a PostScript monitor event, or fold them into a
/// metrics counter; this crate's core makes no assumption about which.
pub trait UsageReporter {
    fn report(&self, dl: EraseNr, screens: &[ScreenUsage]);
}

/// Walk every screen with a levels record for `dl` and hand the
/// collected figures to `reporter`.
pub fn report_screen_usage(cache: &mut ScreenCache, dl: EraseNr, reporter: &dyn UsageReporter) {
    let ids = cache.iter_for_dl(dl);
    let usages: Vec<ScreenUsage> = ids
        .iter()
        .filter_map(|&id| {
            let handle = cache.get(id)?;
            let screen = handle.read().unwrap();
            let rec = screen.levels.find(dl)?;
            Some(ScreenUsage {
                screen: id,
                levels_used: rec.levels_used,
                number_cached: rec.number_cached,
            })
        })
        .collect();
    reporter.report(dl, &usages);
}

/// A reporter that logs a single summary line through the crate's
/// logging macros; the default when no collaborator is wired up.
pub struct LoggingUsageReporter;

impl UsageReporter for LoggingUsageReporter {
    fn report(&self, dl: EraseNr, screens: &[ScreenUsage]) {
        let total_used: u32 = screens.iter().map(|s| s.levels_used).sum();
        let total_cached: u32 = screens.iter().map(|s| s.number_cached).sum();
        let pct = if total_used == 0 {
            100.0
        } else {
            100.0 * total_cached as f32 / total_used as f32
        };
        utils::info!(
            "end_sheet usage for DL {}: {} screens, {}/{} levels cached ({:.1}%)",
            dl,
            screens.len(),
            total_cached,
            total_used,
            pct
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_satisfied_handles_zero_usage() {
        let usage = ScreenUsage {
            screen: crate::types::ScreenId(0),
            levels_used: 0,
            number_cached: 0,
        };
        assert_eq!(usage.percent_satisfied(), 100.0);
    }

    #[test]
    fn percent_satisfied_computes_ratio() {
        let usage = ScreenUsage {
            screen: crate::types::ScreenId(0),
            levels_used: 10,
            number_cached: 5,
        };
        assert_eq!(usage.percent_satisfied(), 50.0);
    }
}
