use comfy_table::modifiers::{UTF8_ROUND_CORNERS, UTF8_SOLID_INNER_BORDERS};
use comfy_table::presets::{UTF8_FULL, UTF8_FULL_CONDENSED};
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use sheetmap_map::SheetSelection;
use sheetmap_model::{
    ColumnMapping, ConfidenceTier, Diagnostic, HistoricalRecord, MappingWarning, Severity,
};

use crate::commands::{ConfirmOutcome, MapOutcome};

pub fn print_map_summary(outcome: &MapOutcome) {
    let result = &outcome.result;
    println!("Sheet: {}", result.sheet_name);
    println!("Target table: {}", result.target_table);
    if !outcome.ai_enabled {
        println!("AI matching: off");
    }
    if let Some(selection) = &outcome.selection {
        print_selection_table(selection);
    }

    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Source column"),
        header_cell("Target"),
        header_cell("Confidence"),
        header_cell("Tier"),
        header_cell("Source"),
        header_cell("Rationale"),
    ]);
    apply_summary_table_style(&mut table);
    align_column(&mut table, 2, CellAlignment::Right);
    align_column(&mut table, 3, CellAlignment::Center);
    for mapping in &result.mappings {
        let tier = mapping.tier(&outcome.thresholds);
        table.add_row(vec![
            Cell::new(&mapping.source_header),
            target_cell(mapping),
            confidence_cell(mapping.confidence(), tier),
            tier_cell(tier),
            dim_cell(mapping.provenance.label()),
            rationale_cell(mapping.rationale.as_deref()),
        ]);
    }
    println!("{table}");
    println!(
        "Overall confidence: {:.2} ({})",
        result.overall_confidence,
        outcome.thresholds.categorize(result.overall_confidence).label()
    );
    print_tier_counts(outcome);

    for warning in &result.warnings {
        match warning {
            MappingWarning::UnmetRequired { target_column } => {
                eprintln!("warning: required column '{target_column}' has no source column");
            }
        }
    }
    print_diagnostics(&result.diagnostics);
}

fn print_selection_table(selection: &SheetSelection) {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("#"),
        header_cell("Sheet"),
        header_cell("Score"),
        header_cell("Matched"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 0, CellAlignment::Right);
    align_column(&mut table, 2, CellAlignment::Right);
    for candidate in &selection.candidates {
        let chosen = candidate.index == selection.index;
        let name = if candidate.ai_assisted {
            format!("{} (AI)", candidate.name)
        } else {
            candidate.name.clone()
        };
        let name_cell = if chosen {
            Cell::new(name).fg(Color::Green).add_attribute(Attribute::Bold)
        } else {
            Cell::new(name)
        };
        table.add_row(vec![
            Cell::new(candidate.index),
            name_cell,
            Cell::new(format!("{:.2}", candidate.score)),
            Cell::new(candidate.matched.join(", ")),
        ]);
    }
    for excluded in &selection.excluded {
        table.add_row(vec![
            dim_cell(excluded.index),
            dim_cell(format!("{} (no data rows)", excluded.name)),
            dim_cell("-"),
            dim_cell("-"),
        ]);
    }
    println!("{table}");
}

fn print_tier_counts(outcome: &MapOutcome) {
    let counts = outcome.result.count_by_tier(&outcome.thresholds);
    let parts: Vec<String> = counts
        .iter()
        .rev()
        .map(|(tier, count)| format!("{} {count}", tier.label()))
        .collect();
    if !parts.is_empty() {
        println!("Columns by tier: {}", parts.join(", "));
    }
}

fn print_diagnostics(diagnostics: &[Diagnostic]) {
    if diagnostics.is_empty() {
        return;
    }
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Severity"),
        header_cell("Kind"),
        header_cell("Message"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 0, CellAlignment::Center);
    for diagnostic in diagnostics {
        table.add_row(vec![
            severity_cell(diagnostic.severity()),
            Cell::new(diagnostic.kind()),
            Cell::new(diagnostic.to_string()),
        ]);
    }
    println!();
    println!("Diagnostics:");
    println!("{table}");
}

pub fn print_confirm_summary(outcome: &ConfirmOutcome) {
    if outcome.demoted > 0 {
        println!("Dropped below minimum tier: {}", outcome.demoted);
    }
    println!("Recorded: {}", outcome.summary.recorded);
    if outcome.summary.skipped > 0 {
        println!("Skipped (blank or repeated header): {}", outcome.summary.skipped);
    }
}

pub fn print_history(records: &[HistoricalRecord]) {
    if records.is_empty() {
        println!("No remembered mappings.");
        return;
    }
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Table"),
        header_cell("Header"),
        header_cell("Target"),
        header_cell("Count"),
        header_cell("Last used"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 3, CellAlignment::Right);
    for record in records {
        table.add_row(vec![
            Cell::new(&record.target_table).fg(Color::Blue),
            Cell::new(&record.normalized_header),
            Cell::new(&record.target_column),
            Cell::new(record.occurrence_count),
            dim_cell(record.last_used.format("%Y-%m-%d %H:%M")),
        ]);
    }
    println!("{table}");
}

fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn apply_summary_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .apply_modifier(UTF8_SOLID_INNER_BORDERS)
        .set_content_arrangement(ContentArrangement::DynamicFullWidth)
        .set_width(140);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn target_cell(mapping: &ColumnMapping) -> Cell {
    match &mapping.target_column {
        Some(target) => Cell::new(target).add_attribute(Attribute::Bold),
        None => dim_cell("-"),
    }
}

fn confidence_cell(confidence: f32, tier: ConfidenceTier) -> Cell {
    if tier == ConfidenceTier::Unresolved {
        dim_cell("-")
    } else {
        Cell::new(format!("{confidence:.2}")).fg(tier_color(tier))
    }
}

fn tier_cell(tier: ConfidenceTier) -> Cell {
    let cell = Cell::new(tier.label().to_uppercase()).fg(tier_color(tier));
    if tier == ConfidenceTier::High {
        cell.add_attribute(Attribute::Bold)
    } else {
        cell
    }
}

fn tier_color(tier: ConfidenceTier) -> Color {
    match tier {
        ConfidenceTier::High => Color::Green,
        ConfidenceTier::Medium => Color::Yellow,
        ConfidenceTier::Low => Color::Red,
        ConfidenceTier::Unresolved => Color::DarkGrey,
    }
}

fn severity_cell(severity: Severity) -> Cell {
    match severity {
        Severity::Warning => Cell::new("WARN").fg(Color::Yellow),
        Severity::Info => Cell::new("INFO").fg(Color::Cyan),
    }
}

fn rationale_cell(rationale: Option<&str>) -> Cell {
    match rationale {
        Some(text) => Cell::new(text),
        None => dim_cell("-"),
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}
