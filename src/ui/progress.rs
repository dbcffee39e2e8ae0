use crate::orchestrator::PipelineResult;
use crate::regeneration::FailedScene;
use crate::stage::StageName;
use crate::ui::icons::{CHECK, CROSS, FILM, RETRY, SCORE, SPARKLE, WARN};
use clipforge_common::{ConsistencyReport, RetryStats};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

/// Terminal UI for a pipeline run, rendered via `indicatif` progress bars.
///
/// Two bars are stacked vertically:
/// - Stage bar: how many pipeline stages have completed
/// - Attempt bar: spinner for the stage currently executing
pub struct PipelineUI {
    multi: MultiProgress,
    stage_bar: ProgressBar,
    attempt_bar: ProgressBar,
    verbose: bool,
}

impl PipelineUI {
    /// Create the UI for a run of `total_stages` stages.
    pub fn new(total_stages: u64, verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let stage_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let stage_bar = multi.add(ProgressBar::new(total_stages));
        stage_bar.set_style(stage_style);
        stage_bar.set_prefix("Stages");

        let attempt_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .expect("progress bar template is a valid static string");

        let attempt_bar = multi.add(ProgressBar::new_spinner());
        attempt_bar.set_style(attempt_style);
        attempt_bar.set_prefix("   Now");

        Self {
            multi,
            stage_bar,
            attempt_bar,
            verbose,
        }
    }

    /// Print a line via `MultiProgress`, falling back to `eprintln!` if the rich UI fails.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    pub fn print_header(&self, session_id: &str) {
        self.print_line("");
        self.print_line(format!("{}", style("═".repeat(70)).cyan()));
        self.print_line(format!(
            "{} Pipeline session {}",
            style("▶").green().bold(),
            style(session_id).yellow().bold()
        ));
        self.print_line(format!("{}", style("═".repeat(70)).cyan()));
    }

    /// Show the stage about to run and start the spinner.
    pub fn start_stage(&self, stage: StageName) {
        self.stage_bar
            .set_message(format!("{}", style(stage.display_name()).yellow()));
        self.attempt_bar.set_message(format!(
            "{} {}",
            stage.display_name(),
            style("(running...)").dim()
        ));
        self.attempt_bar
            .enable_steady_tick(Duration::from_millis(100));
    }

    /// Advance the stage bar. Retries, if any, are listed with their backoffs.
    pub fn stage_complete(&self, stage: StageName, attempts: u32, backoffs: &[Duration]) {
        self.show_backoffs(stage, backoffs);
        self.stage_bar.inc(1);
        let suffix = if attempts > 1 {
            format!(" after {attempts} attempts")
        } else {
            String::new()
        };
        self.print_line(format!(
            "  {} {}{}",
            CHECK,
            style(stage.display_name()).green(),
            style(suffix).dim()
        ));
    }

    pub fn stage_failed(&self, stage: StageName, reason: &str, attempts: u32, backoffs: &[Duration]) {
        self.show_backoffs(stage, backoffs);
        self.attempt_bar.finish_with_message(format!(
            "{} {} failed after {} attempt(s)",
            CROSS,
            stage.display_name(),
            attempts
        ));
        self.print_line(format!(
            "  {} {}: {}",
            CROSS,
            style(stage.display_name()).red().bold(),
            reason
        ));
    }

    fn show_backoffs(&self, stage: StageName, backoffs: &[Duration]) {
        if !self.verbose {
            return;
        }
        for (retry, delay) in backoffs.iter().enumerate() {
            self.print_line(format!(
                "    {} {} retry {} after {}ms",
                RETRY,
                style(stage.as_str()).dim(),
                retry + 1,
                delay.as_millis()
            ));
        }
    }

    pub fn show_consistency(&self, report: &ConsistencyReport) {
        self.print_line(format!(
            "    {} overall {:.2} | {} passed, {} failed (threshold {:.2}, {:?} mode)",
            SCORE,
            report.overall_score,
            style(report.passed_artifacts.len()).green(),
            style(report.failed_artifacts.len()).red(),
            report.threshold,
            report.mode
        ));
        if self.verbose {
            for issue in report.dimensions.all_issues() {
                self.print_line(format!("      {} {}", style("-").dim(), style(issue).dim()));
            }
        }
    }

    pub fn show_regeneration(&self, stats: &RetryStats, failed_scenes: &[FailedScene]) {
        self.print_line(format!(
            "    {} regenerated {} scene(s) with {} attempt(s): {} recovered, {} exhausted",
            RETRY,
            stats.total_scenes,
            stats.total_retries,
            style(stats.successful_regenerations).green(),
            style(stats.failed_regenerations).red()
        ));
        for scene in failed_scenes {
            self.print_line(format!(
                "      {} scene {} still has {} failing artifact(s)",
                WARN,
                style(&scene.scene_id).yellow(),
                scene.remaining_artifacts.len()
            ));
        }
    }

    /// Stop the spinner and print the final banner.
    pub fn finish(&self, result: &PipelineResult) {
        self.attempt_bar.finish_and_clear();
        if result.success {
            self.stage_bar.finish_with_message("done");
            self.print_line(format!("\n{} Pipeline complete!", SPARKLE));
            if let Some(path) = &result.final_video_path {
                self.print_line(format!("  {} {}", FILM, style(path).green().bold()));
            }
        } else {
            self.stage_bar.abandon_with_message("failed");
            self.print_line(format!(
                "\n{} Pipeline failed at {}: {}",
                CROSS,
                style(result.failed_stage.as_deref().unwrap_or("setup")).red().bold(),
                result.error.as_deref().unwrap_or("unknown error")
            ));
        }
        for warning in &result.warnings {
            self.print_line(format!("  {} {}", WARN, warning));
        }
    }
}
