//! Implements InputPort. Inquire-based interactive menu.
//!
//! Main menu: generate a report for a resident and period, segment a transcript file, exit.
//! Service errors are shown and the menu comes back; only prompt failures end the loop.

use crate::domain::composer::truncate_chars;
use crate::domain::{DomainError, ReportPeriod, ReportSection};
use crate::ports::InputPort;
use crate::usecases::{ReportService, SegmentService};
use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use crossterm::style::Stylize;
use inquire::error::InquireError;
use inquire::ui::{Color, RenderConfig, StyleSheet, Styled};
use inquire::{Select, Text};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use super::progress::with_spinner;

const MENU_REPORT: &str = "Generate progress report";
const MENU_SEGMENT: &str = "Segment a meeting transcript";
const MENU_EXIT: &str = "Exit";

/// Applies the prompt theme globally. Call once before the first prompt.
pub fn apply_theme() {
    let accent = Color::rgb(0xf4, 0xa2, 0x59);
    let muted = Color::rgb(0x0b, 0x6e, 0x69);
    let config = RenderConfig::default()
        .with_prompt_prefix(Styled::new("›").with_fg(accent))
        .with_highlighted_option_prefix(Styled::new("▸").with_fg(accent))
        .with_answered_prompt_prefix(Styled::new("✔").with_fg(muted))
        .with_selected_option(Some(StyleSheet::new().with_fg(accent)))
        .with_help_message(StyleSheet::new().with_fg(muted));
    inquire::set_global_render_config(config);
}

fn prompt_error(e: InquireError) -> DomainError {
    DomainError::Ui(e.to_string())
}

fn is_cancel(e: &InquireError) -> bool {
    matches!(
        e,
        InquireError::OperationCanceled | InquireError::OperationInterrupted
    )
}

/// Parse a `YYYY-MM-DD` date typed at a prompt.
pub fn parse_date(raw: &str) -> Result<NaiveDate, DomainError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|e| DomainError::Input(format!("'{}' is not a YYYY-MM-DD date: {}", raw.trim(), e)))
}

/// TUI adapter. Inquire prompts.
pub struct TuiInputPort {
    reports: Arc<ReportService>,
    segments: Arc<SegmentService>,
}

impl TuiInputPort {
    pub fn new(reports: Arc<ReportService>, segments: Arc<SegmentService>) -> Self {
        Self { reports, segments }
    }

    async fn report_flow(&self) -> Result<(), DomainError> {
        let resident = Text::new("Resident id:")
            .prompt()
            .map_err(prompt_error)?;
        let today = Local::now().date_naive();
        let default_start = today - chrono::Duration::days(30);
        let start = Text::new("Period start (YYYY-MM-DD):")
            .with_default(&default_start.format("%Y-%m-%d").to_string())
            .prompt()
            .map_err(prompt_error)?;
        let end = Text::new("Period end (YYYY-MM-DD):")
            .with_default(&today.format("%Y-%m-%d").to_string())
            .prompt()
            .map_err(prompt_error)?;
        let period = ReportPeriod::new(parse_date(&start)?, parse_date(&end)?)?;

        let outcome = with_spinner(
            "Classifying entries…",
            self.reports.generate_report(resident.trim(), &period),
        )
        .await?;

        let c = &outcome.classification;
        println!();
        for section in ReportSection::ALL {
            let n = c.section(section).map_or(0, |b| b.items.len());
            println!("  {:<24} {}", section.title(), n);
        }
        println!("  {:<24} {}", "Uncategorized", c.uncategorized.len());
        println!(
            "\n{} {} ({:?})\n",
            "Report written:".green(),
            outcome.path.display(),
            c.method
        );
        Ok(())
    }

    async fn segment_flow(&self) -> Result<(), DomainError> {
        let path = Text::new("Transcript file:")
            .prompt()
            .map_err(prompt_error)?;
        let path = Path::new(path.trim());
        let transcript = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| DomainError::Input(format!("read {}: {}", path.display(), e)))?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "transcript".to_string());

        let (result, saved) = with_spinner(
            "Segmenting transcript…",
            self.segments.segment_and_store(&name, &transcript),
        )
        .await?;

        println!();
        for segment in &result.segments {
            println!(
                "  [{:<11}] {:.2}  {}",
                segment.category.as_str(),
                segment.confidence,
                truncate_chars(&segment.text, 70)
            );
        }
        println!(
            "\n{} {} ({:?})\n",
            "Segments written:".green(),
            saved.display(),
            result.method
        );
        Ok(())
    }
}

#[async_trait]
impl InputPort for TuiInputPort {
    async fn run(&self) -> Result<(), DomainError> {
        loop {
            let choice = match Select::new("What would you like to do?", vec![
                MENU_REPORT,
                MENU_SEGMENT,
                MENU_EXIT,
            ])
            .prompt()
            {
                Ok(choice) => choice,
                Err(e) if is_cancel(&e) => break,
                Err(e) => return Err(prompt_error(e)),
            };

            let outcome = match choice {
                MENU_REPORT => self.report_flow().await,
                MENU_SEGMENT => self.segment_flow().await,
                _ => break,
            };
            match outcome {
                Ok(()) => {}
                Err(DomainError::Ui(msg)) => {
                    info!(reason = %msg, "prompt cancelled, back to menu");
                }
                Err(e) => println!("{} {}\n", "Error:".red(), e),
            }
        }
        info!("exiting");
        Ok(())
    }
}
