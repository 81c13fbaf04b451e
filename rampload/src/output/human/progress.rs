use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

/// One line per scenario on stderr. Scenarios with a known end get a bar, others a spinner.
pub(crate) struct HumanProgress {
    inner: Mutex<Bars>,
}

struct Bars {
    multi: MultiProgress,
    by_scenario: HashMap<String, ProgressBar>,
}

impl HumanProgress {
    pub(crate) fn new() -> Self {
        let multi = MultiProgress::new();
        multi.set_draw_target(ProgressDrawTarget::stderr_with_hz(5));

        Self {
            inner: Mutex::new(Bars {
                multi,
                by_scenario: HashMap::new(),
            }),
        }
    }

    pub(crate) fn update(
        &self,
        scenario: &str,
        total: Option<Duration>,
        elapsed: Duration,
        message: String,
    ) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let Bars { multi, by_scenario } = &mut *inner;

        let pb = by_scenario
            .entry(scenario.to_string())
            .or_insert_with(|| new_bar(multi, scenario, total.is_some()));
        pb.set_message(message);

        match total {
            Some(total) => {
                let total_ms = total.as_millis() as u64;
                pb.set_length(total_ms);
                pb.set_position((elapsed.as_millis() as u64).min(total_ms));
            }
            None => pb.tick(),
        }
    }

    pub(crate) fn finish(&self) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        for (_, pb) in inner.by_scenario.drain() {
            pb.finish_and_clear();
        }
        let _ = inner.multi.clear();
    }
}

fn new_bar(multi: &MultiProgress, scenario: &str, bounded: bool) -> ProgressBar {
    let pb = if bounded {
        let pb = multi.add(ProgressBar::new(0));
        pb.set_style(bar_style());
        pb
    } else {
        let pb = multi.add(ProgressBar::new_spinner());
        pb.set_style(spinner_style());
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    };
    pb.set_prefix(scenario.to_string());
    pb
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix} [ {bar:20.cyan/blue} ] {percent:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█░")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix} {spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}
