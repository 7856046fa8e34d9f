//! Progress reporting and display
//!
//! The executor reports through [`ProgressReporter`] so the core stays
//! decoupled from how (and whether) progress is drawn.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
    time::{Duration, Instant},
};

/// Status of one root table run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootStatus {
    /// Creating tables and seeding counters
    Initializing,
    /// Paginating the source
    Extracting { chunk: u64, total: u64 },
    /// All chunks flushed
    Done { rows: u64 },
    Failed(String),
}

/// Phase of the overall run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchPhase {
    LoadingConfig,
    ParsingMapping,
    Normalizing,
    Completed,
    Failed(String),
}

pub trait ProgressReporter: Send + Sync {
    fn set_phase(&self, phase: BatchPhase);

    /// Register root tables to track, before processing starts.
    fn register_roots(&self, roots: Vec<String>);

    fn update_root(&self, root: &str, status: RootStatus);

    fn log_info(&self, message: &str);

    fn log_warn(&self, message: &str);

    fn log_error(&self, message: &str);

    fn finish(&self);
}

/// A no-op reporter for when progress display is disabled.
pub struct NullReporter;

impl ProgressReporter for NullReporter {
    fn set_phase(&self, _phase: BatchPhase) {}
    fn register_roots(&self, _roots: Vec<String>) {}
    fn update_root(&self, _root: &str, _status: RootStatus) {}
    fn log_info(&self, _message: &str) {}
    fn log_warn(&self, _message: &str) {}
    fn log_error(&self, _message: &str) {}
    fn finish(&self) {}
}

#[derive(Debug, Default)]
struct Stats {
    total_roots: usize,
    successful_roots: usize,
    failed_roots: usize,
    rows: u64,
    start_time: Option<Instant>,
}

impl Stats {
    fn started() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    fn record(&mut self, status: &RootStatus) {
        match status {
            RootStatus::Done { rows } => {
                self.successful_roots += 1;
                self.rows += rows;
            }
            RootStatus::Failed(_) => self.failed_roots += 1,
            _ => {}
        }
    }

    fn print_summary(&self) {
        let duration = self.start_time.map(|t| t.elapsed()).unwrap_or_default();

        eprintln!();
        eprintln!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        eprintln!("📊 Summary");
        eprintln!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        eprintln!("   🌳 Roots:      {} total", self.total_roots);
        eprintln!("   ✅ Successful: {}", self.successful_roots);
        if self.failed_roots > 0 {
            eprintln!("   ❌ Failed:     {}", self.failed_roots);
        }
        eprintln!("   🧾 Rows:       {}", self.rows);
        eprintln!("   ⏱️  Duration:   {:.2}s", duration.as_secs_f64());
        eprintln!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }
}

fn phase_message(phase: &BatchPhase) -> String {
    match phase {
        BatchPhase::LoadingConfig => "📋 Loading configuration...".to_owned(),
        BatchPhase::ParsingMapping => "🔧 Parsing mapping...".to_owned(),
        BatchPhase::Normalizing => "🗄️  Normalizing tables...".to_owned(),
        BatchPhase::Completed => "✅ Completed!".to_owned(),
        BatchPhase::Failed(e) => format!("❌ Failed: {e}"),
    }
}

/// Plain stderr output, for non-TTY.
pub struct SimpleReporter {
    stats: RwLock<Stats>,
}

impl SimpleReporter {
    pub fn new() -> Self {
        Self {
            stats: RwLock::new(Stats::started()),
        }
    }
}

impl Default for SimpleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for SimpleReporter {
    fn set_phase(&self, phase: BatchPhase) {
        eprintln!("{}", phase_message(&phase));
    }

    fn register_roots(&self, roots: Vec<String>) {
        if let Ok(mut stats) = self.stats.write() {
            stats.total_roots = roots.len();
        }
        eprintln!("   Found {} root tables", roots.len());
    }

    fn update_root(&self, root: &str, status: RootStatus) {
        if let Ok(mut stats) = self.stats.write() {
            stats.record(&status);
        }
        match status {
            RootStatus::Initializing => eprintln!("   ⚙️  {root}: initializing"),
            RootStatus::Extracting { chunk, total } => {
                eprintln!("   📄 {root}: chunk {chunk}/{total}")
            }
            RootStatus::Done { rows } => eprintln!("   ✓ {root} ({rows} rows)"),
            RootStatus::Failed(e) => eprintln!("   ✗ {root}: {e}"),
        }
    }

    fn log_info(&self, message: &str) {
        eprintln!("ℹ️  {message}");
    }

    fn log_warn(&self, message: &str) {
        eprintln!("⚠️  {message}");
    }

    fn log_error(&self, message: &str) {
        eprintln!("❌ {message}");
    }

    fn finish(&self) {
        if let Ok(stats) = self.stats.read() {
            stats.print_summary();
        }
    }
}

/// Interactive progress bars, for TTY.
pub struct FancyReporter {
    multi: indicatif::MultiProgress,
    phase_bar: indicatif::ProgressBar,
    roots: RwLock<HashMap<String, Option<indicatif::ProgressBar>>>,
    stats: RwLock<Stats>,
}

impl FancyReporter {
    pub fn new() -> Self {
        let multi = indicatif::MultiProgress::new();
        let phase_bar = multi.add(indicatif::ProgressBar::new_spinner());
        if let Ok(style) = indicatif::ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")
        {
            phase_bar.set_style(style);
        }
        phase_bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            multi,
            phase_bar,
            roots: RwLock::new(HashMap::new()),
            stats: RwLock::new(Stats::started()),
        }
    }

    fn chunk_bar(&self, root: &str, total: u64) -> indicatif::ProgressBar {
        let bar = self.multi.add(indicatif::ProgressBar::new(total));
        if let Ok(style) = indicatif::ProgressStyle::default_bar()
            .template("   {prefix} {bar:40.cyan/blue} {pos}/{len} chunks")
        {
            bar.set_style(style.progress_chars("█▓▒░  "));
        }
        bar.set_prefix(root.to_owned());
        bar
    }
}

impl Default for FancyReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for FancyReporter {
    fn set_phase(&self, phase: BatchPhase) {
        let msg = phase_message(&phase);
        if matches!(phase, BatchPhase::Completed | BatchPhase::Failed(_)) {
            self.phase_bar.finish_with_message(msg);
        } else {
            self.phase_bar.set_message(msg);
        }
    }

    fn register_roots(&self, roots: Vec<String>) {
        if let Ok(mut stats) = self.stats.write() {
            stats.total_roots = roots.len();
        }
        if let Ok(mut map) = self.roots.write() {
            // bars are created lazily, once the chunk count is known
            map.extend(roots.into_iter().map(|root| (root, None)));
        }
    }

    fn update_root(&self, root: &str, status: RootStatus) {
        if let Ok(mut stats) = self.stats.write() {
            stats.record(&status);
        }
        let Ok(mut map) = self.roots.write() else {
            return;
        };
        match status {
            RootStatus::Extracting { chunk, total } => {
                let slot = map.entry(root.to_owned()).or_default();
                let bar = slot.get_or_insert_with(|| self.chunk_bar(root, total));
                bar.set_length(total);
                bar.set_position(chunk);
            }
            RootStatus::Done { rows } => {
                if let Some(Some(bar)) = map.remove(root) {
                    bar.finish_and_clear();
                }
                self.multi.println(format!("   ✅ {root} ({rows} rows)")).ok();
            }
            RootStatus::Failed(e) => {
                if let Some(Some(bar)) = map.remove(root) {
                    bar.abandon();
                }
                self.multi.println(format!("   ❌ {root}: {e}")).ok();
            }
            RootStatus::Initializing => {
                self.phase_bar
                    .set_message(format!("⚙️  Initializing {root}..."));
            }
        }
    }

    fn log_info(&self, message: &str) {
        self.multi.println(format!("ℹ️  {message}")).ok();
    }

    fn log_warn(&self, message: &str) {
        self.multi.println(format!("⚠️  {message}")).ok();
    }

    fn log_error(&self, message: &str) {
        self.multi.println(format!("❌ {message}")).ok();
    }

    fn finish(&self) {
        if let Ok(map) = self.roots.read() {
            for bar in map.values().flatten() {
                bar.finish_and_clear();
            }
        }
        self.phase_bar.finish_and_clear();
        if let Ok(stats) = self.stats.read() {
            stats.print_summary();
        }
    }
}

/// Create an appropriate reporter based on terminal capabilities.
pub fn create_reporter() -> Arc<dyn ProgressReporter> {
    if console::Term::stderr().is_term() {
        Arc::new(FancyReporter::new())
    } else {
        Arc::new(SimpleReporter::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_record() {
        let mut stats = Stats::started();
        stats.record(&RootStatus::Initializing);
        stats.record(&RootStatus::Done { rows: 9 });
        stats.record(&RootStatus::Done { rows: 3 });
        stats.record(&RootStatus::Failed("boom".into()));
        assert_eq!(stats.successful_roots, 2);
        assert_eq!(stats.failed_roots, 1);
        assert_eq!(stats.rows, 12);
    }
}
