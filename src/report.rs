// Rendering of inspections for status displays

use crate::error::Result;
use crate::process::Inspection;
use colored::*;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Tabled)]
struct InspectionRow {
    #[tabled(rename = "PID")]
    pid: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Running")]
    running: String,
    #[tabled(rename = "Alive")]
    alive: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "User")]
    user: String,
    #[tabled(rename = "Tried")]
    tried: String,
    #[tabled(rename = "Uptime")]
    uptime: String,
    #[tabled(rename = "Command")]
    command: String,
}

impl From<&Inspection> for InspectionRow {
    fn from(inspection: &Inspection) -> Self {
        let running = if inspection.is_running {
            "ok".green().to_string()
        } else {
            "failed".red().to_string()
        };

        Self {
            pid: if inspection.pid > 0 {
                inspection.pid.to_string()
            } else {
                "-".to_string()
            },
            name: or_dash(&inspection.name),
            running,
            alive: format!("{:.4}s", inspection.alive_secs),
            status: or_dash(&inspection.status),
            user: or_dash(&inspection.user),
            tried: inspection.tried_count.to_string(),
            uptime: inspection
                .uptime
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string()),
            command: format!("{} {}", inspection.command, inspection.args)
                .trim_end()
                .to_string(),
        }
    }
}

fn or_dash(value: &str) -> String {
    if value.is_empty() {
        "-".to_string()
    } else {
        value.to_string()
    }
}

/// Render inspections as a table
pub fn render_inspections(inspections: &[Inspection]) -> String {
    if inspections.is_empty() {
        return "No processes are registered".yellow().to_string();
    }

    let rows: Vec<InspectionRow> = inspections.iter().map(InspectionRow::from).collect();

    let mut table = Table::new(rows);
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));

    table.to_string()
}

/// Serialize inspections as pretty JSON
pub fn inspections_json(inspections: &[Inspection]) -> Result<String> {
    Ok(serde_json::to_string_pretty(inspections)?)
}
