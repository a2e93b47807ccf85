/*!
 * jobplan CLI Style System
 *
 * Styling helpers for plan listings and part details.
 */

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use console::{style, StyledObject};
use jobplan_core_plan::{JobPartPlan, StatusCode, INVALID_STATUS_NAME};

use crate::output::{PartSummary, TransferRow};

// ============================================================================
// THEME COLORS
// ============================================================================

/// Brand colors for consistent styling
pub struct Theme;

impl Theme {
    pub fn primary<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).cyan()
    }

    pub fn success<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).green()
    }

    pub fn warning<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).yellow()
    }

    pub fn error<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).red().bold()
    }

    pub fn muted<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).dim()
    }
}

/// Unicode icons for visual feedback
pub struct Icons;

impl Icons {
    pub const SUCCESS: &'static str = "✓";
    pub const ERROR: &'static str = "✗";
    pub const WARNING: &'static str = "⚠";
    pub const INFO: &'static str = "ℹ";
    pub const PENDING: &'static str = "○";
    pub const PAUSED: &'static str = "‖";
}

// ============================================================================
// TABLES
// ============================================================================

/// Create a styled data table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Create a minimal table (no outer borders)
pub fn create_minimal_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_NO_BORDERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn header_cells(names: &[&str]) -> Vec<Cell> {
    names
        .iter()
        .map(|name| {
            Cell::new(name)
                .fg(Color::Cyan)
                .add_attribute(Attribute::Bold)
        })
        .collect()
}

/// Colored cell for a status name
fn status_cell(name: &str) -> Cell {
    let color = match name {
        "Completed" => Color::Green,
        "Failed" | "Cancelled" => Color::Red,
        "Paused" => Color::Yellow,
        INVALID_STATUS_NAME => Color::Magenta,
        _ => Color::White,
    };
    Cell::new(name).fg(color)
}

/// One row per part
pub fn parts_table(parts: &[PartSummary]) -> Table {
    let mut table = create_table();
    table.set_header(header_cells(&[
        "Job", "Part", "Priority", "Status", "Done", "Failed", "Pending", "Total",
    ]));
    for part in parts {
        table.add_row(vec![
            Cell::new(part.job_id.to_string()),
            Cell::new(part.part_num),
            Cell::new(part.priority.to_string()),
            status_cell(part.job_status),
            Cell::new(part.progress.completed).fg(Color::Green),
            Cell::new(part.progress.failed).fg(if part.progress.failed > 0 {
                Color::Red
            } else {
                Color::DarkGrey
            }),
            Cell::new(part.progress.in_progress),
            Cell::new(part.progress.total),
        ]);
    }
    table
}

/// Key-value table describing a part header
pub fn header_table(part: &PartSummary) -> Table {
    let mut table = create_minimal_table();
    let rows: [(&str, String); 11] = [
        ("Job ID", part.job_id.to_string()),
        ("Part", part.part_num.to_string()),
        ("Final part", part.is_final_part.to_string()),
        ("Priority", format!("{} ({} queue)", part.priority, part.channel)),
        ("Job status", part.job_status.to_string()),
        ("Locations", format!("{} -> {}", part.src_location, part.dst_location)),
        ("TTL after completion", format_duration(part.ttl_after_completion as u64)),
        ("Block size", format_bytes(part.block_size)),
        ("Log severity", format!("{:?}", part.log_severity)),
        ("Transfers", part.progress.total.to_string()),
        ("Progress", format!("{:.1}%", part.progress.completion_percent())),
    ];
    for (key, value) in rows {
        table.add_row(vec![
            Cell::new(key).fg(Color::Cyan),
            Cell::new(value).add_attribute(Attribute::Bold),
        ]);
    }
    table
}

/// One row per transfer
pub fn transfers_table(rows: &[TransferRow]) -> Table {
    let mut table = create_table();
    table.set_header(header_cells(&[
        "#", "Source", "Destination", "Size", "Chunks", "Status", "Finished",
    ]));
    for row in rows {
        table.add_row(vec![
            Cell::new(row.index),
            Cell::new(&row.source),
            Cell::new(&row.destination),
            Cell::new(format_bytes(row.source_size)),
            Cell::new(row.chunk_num),
            status_cell(row.status),
            Cell::new(row.completed_at.as_deref().unwrap_or("-")).fg(Color::DarkGrey),
        ]);
    }
    table
}

/// Icon reflecting how far a part got
pub fn part_icon(plan: &JobPartPlan) -> &'static str {
    let progress = plan.progress();
    if progress.failed > 0 || progress.invalid > 0 {
        Icons::WARNING
    } else if plan.all_transfers_terminal() {
        Icons::SUCCESS
    } else if plan.job_status().code() == jobplan_core_plan::JobStatus::Paused.code() {
        Icons::PAUSED
    } else {
        Icons::PENDING
    }
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Format bytes into human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let base = 1024.0_f64;
    let exp = (bytes_f.ln() / base.ln()).floor() as usize;
    let exp = exp.min(UNITS.len() - 1);

    let value = bytes_f / base.powi(exp as i32);

    if exp == 0 {
        format!("{} {}", bytes, UNITS[exp])
    } else {
        format!("{:.2} {}", value, UNITS[exp])
    }
}

/// Format whole seconds into a short human-readable string
pub fn format_duration(secs: u64) -> String {
    match secs {
        0 => "none".to_string(),
        s if s < 60 => format!("{}s", s),
        s if s < 3600 => format!("{}m {}s", s / 60, s % 60),
        s if s < 86_400 => format!("{}h {}m", s / 3600, (s % 3600) / 60),
        s => format!("{}d {}h", s / 86_400, (s % 86_400) / 3600),
    }
}

/// Print a styled error message with optional suggestion
pub fn print_error(message: &str, suggestion: Option<&str>) {
    eprintln!(
        "{} {}",
        Theme::error(Icons::ERROR.to_string()),
        Theme::error(message)
    );
    if let Some(hint) = suggestion {
        eprintln!("  {}", Theme::muted(hint));
    }
}

/// Print a styled warning message
pub fn print_warning(message: &str) {
    eprintln!(
        "{} {}",
        Theme::warning(Icons::WARNING.to_string()),
        Theme::warning(message)
    );
}

/// Print a styled success message
pub fn print_success(message: &str) {
    println!(
        "{} {}",
        Theme::success(Icons::SUCCESS.to_string()),
        Theme::success(message)
    );
}

/// Print a styled info message
pub fn print_info(message: &str) {
    println!("{} {}", Theme::primary(Icons::INFO.to_string()), message);
}
