//! Shared display helpers for requirement statuses and prepare results.

use crate::prepare::PrepareResult;
use crate::requirements::RequirementStatus;
use crate::ui::{should_use_colors, StagehandTheme, UserInterface};

fn theme() -> StagehandTheme {
    if should_use_colors() {
        StagehandTheme::new()
    } else {
        StagehandTheme::plain()
    }
}

/// One line for a requirement: icon, title and status description.
pub fn requirement_line(status: &RequirementStatus) -> String {
    theme().format_requirement(
        status.has_been_provided,
        &status.requirement.title(),
        &status.status_description,
    )
}

/// List requirement statuses. Unless the output mode shows details, only
/// the unsatisfied ones are listed.
pub fn show_statuses(ui: &mut dyn UserInterface, statuses: &[RequirementStatus]) {
    let all = ui.output_mode().shows_details();
    for status in statuses.iter().filter(|s| all || !s.has_been_provided) {
        ui.message(&format!("  {}", requirement_line(status)));
    }
}

/// Print what went wrong with a failed result.
pub fn show_failure(ui: &mut dyn UserInterface, result: &PrepareResult) {
    for error in result.errors() {
        ui.error(error);
    }
    let missing: Vec<_> = result
        .statuses()
        .iter()
        .filter(|s| !s.has_been_provided)
        .cloned()
        .collect();
    if !missing.is_empty() {
        ui.message("Missing requirements to run this project:");
        show_statuses(ui, &missing);
    }
}
