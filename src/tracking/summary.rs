//! Read-only aggregates over tracked sessions.
//!
//! [`display_sessions`] and [`display_session`] render the tables printed by
//! `clipforge sessions`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use clipforge_common::TokenUsage;
use serde::Serialize;

use super::{SessionStatus, TrackedSession};

/// Aggregate view of a single session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub status: SessionStatus,
    pub start_time: DateTime<Utc>,
    pub total_duration_seconds: Option<f64>,
    /// Attempts recorded per stage.
    pub stage_attempts: BTreeMap<String, usize>,
    pub stage_seconds: BTreeMap<String, f64>,
    pub token_totals: BTreeMap<String, TokenUsage>,
    pub content_count: usize,
    pub file_count: usize,
    pub error_count: usize,
}

impl SessionSummary {
    pub fn from_session(id: &str, session: &TrackedSession) -> Self {
        let token_totals = session
            .token_usage
            .iter()
            .map(|(model, records)| {
                let mut total = TokenUsage::default();
                for record in records {
                    total.add(&record.usage);
                }
                (model.clone(), total)
            })
            .collect();

        Self {
            session_id: id.to_string(),
            status: session.status,
            start_time: session.start_time,
            total_duration_seconds: session.total_duration_seconds,
            stage_attempts: session
                .agents
                .iter()
                .map(|(stage, runs)| (stage.clone(), runs.len()))
                .collect(),
            stage_seconds: session.time_tracking.clone(),
            token_totals,
            content_count: session.generated_content.len(),
            file_count: session.file_locations.len(),
            error_count: session.errors.len(),
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.token_totals.values().map(|u| u.total_tokens).sum()
    }
}

/// Aggregate view across every known session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllSessionsSummary {
    pub total_sessions: usize,
    pub completed: usize,
    pub failed: usize,
    pub running: usize,
    pub total_tokens: TokenUsage,
    pub total_duration_seconds: f64,
    pub sessions: Vec<SessionSummary>,
}

impl AllSessionsSummary {
    pub fn from_sessions(sessions: &BTreeMap<String, TrackedSession>) -> Self {
        let mut summary = AllSessionsSummary::default();
        for (id, session) in sessions {
            let item = SessionSummary::from_session(id, session);
            match item.status {
                SessionStatus::Completed => summary.completed += 1,
                SessionStatus::Failed => summary.failed += 1,
                SessionStatus::Running => summary.running += 1,
            }
            for usage in item.token_totals.values() {
                summary.total_tokens.add(usage);
            }
            summary.total_duration_seconds += item.total_duration_seconds.unwrap_or_default();
            summary.sessions.push(item);
        }
        summary.total_sessions = summary.sessions.len();
        summary
    }

    /// Fraction of sealed sessions that completed.
    pub fn success_rate(&self) -> f64 {
        let sealed = self.completed + self.failed;
        if sealed == 0 {
            0.0
        } else {
            self.completed as f64 / sealed as f64
        }
    }
}

/// Print one row per session plus totals.
pub fn display_sessions(summary: &AllSessionsSummary) {
    if summary.sessions.is_empty() {
        println!("No tracked sessions.");
        return;
    }

    println!();
    println!("Tracked sessions ({}):", summary.total_sessions);
    println!(
        "{:<26} {:<10} {:<10} {:<10} {:<8}",
        "Session", "Status", "Duration", "Tokens", "Errors"
    );
    println!(
        "{:<26} {:<10} {:<10} {:<10} {:<8}",
        "--------------------------", "----------", "----------", "----------", "--------"
    );
    for item in &summary.sessions {
        println!(
            "{:<26} {:<10} {:<10} {:<10} {:<8}",
            item.session_id,
            item.status.as_str(),
            format_seconds(item.total_duration_seconds),
            item.total_tokens(),
            item.error_count
        );
    }
    println!();
    println!(
        "Completed: {}  Failed: {}  Running: {}  Success rate: {:.0}%",
        summary.completed,
        summary.failed,
        summary.running,
        summary.success_rate() * 100.0
    );
    println!(
        "Tokens: {} (prompt {}, completion {})",
        summary.total_tokens.total_tokens,
        summary.total_tokens.prompt_tokens,
        summary.total_tokens.completion_tokens
    );
}

/// Print the per-stage breakdown of one session.
pub fn display_session(summary: &SessionSummary) {
    println!();
    println!("Session {}", summary.session_id);
    println!("  Status:   {}", summary.status);
    println!("  Started:  {}", summary.start_time.format("%Y-%m-%d %H:%M:%S"));
    println!(
        "  Duration: {}",
        format_seconds(summary.total_duration_seconds)
    );
    println!();
    println!("{:<22} {:<10} {:<10}", "Stage", "Attempts", "Seconds");
    for (stage, attempts) in &summary.stage_attempts {
        let seconds = summary.stage_seconds.get(stage).copied().unwrap_or_default();
        println!("{:<22} {:<10} {:<10.2}", stage, attempts, seconds);
    }
    if !summary.token_totals.is_empty() {
        println!();
        for (model, usage) in &summary.token_totals {
            println!("  {model}: {} tokens", usage.total_tokens);
        }
    }
    println!();
    println!(
        "  Content: {}  Files: {}  Errors: {}",
        summary.content_count, summary.file_count, summary.error_count
    );
}

fn format_seconds(seconds: Option<f64>) -> String {
    match seconds {
        Some(s) => format!("{s:.1}s"),
        None => "-".to_string(),
    }
}
