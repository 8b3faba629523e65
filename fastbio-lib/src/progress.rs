use log::info;

/// Report after every tenth of a batch, but at least every this many requests
const MAX_REPORT_INTERVAL: usize = 250;

/// Periodic progress lines for one batch.
///
/// Only the task collecting the results of a batch touches this, so plain
/// counters are enough.
#[derive(Debug)]
pub(crate) struct Progress<'a> {
    label: &'a str,
    total: usize,
    interval: usize,
    completed: usize,
    from_cache: usize,
}

impl<'a> Progress<'a> {
    pub(crate) fn new(label: &'a str, total: usize) -> Self {
        Self {
            label,
            total,
            interval: report_interval(total),
            completed: 0,
            from_cache: 0,
        }
    }

    /// Record one finished request.
    /// Returns whether a progress line was logged.
    pub(crate) fn record(&mut self, from_cache: bool) -> bool {
        self.completed += 1;
        if from_cache {
            self.from_cache += 1;
        }

        let report = self.completed % self.interval == 0 || self.completed == self.total;
        if report {
            info!(
                "{}: finished {} of {} ({} from cache)",
                self.label, self.completed, self.total, self.from_cache
            );
        }
        report
    }

    pub(crate) const fn from_cache(&self) -> usize {
        self.from_cache
    }
}

/// Number of completions between two progress lines
fn report_interval(total: usize) -> usize {
    (total / 10).clamp(1, MAX_REPORT_INTERVAL)
}
