//! Console tables for coverage and gap maps.

use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, CellAlignment, Table};

use crate::model::{CoverageMap, Fetched, LackingByLanguage};

/// Two-column table of language → percentage, two decimals
pub fn render_percentages(percentages: &CoverageMap, title: &str) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Language", "Percentage"]);

    for (language, percentage) in percentages {
        table.add_row(vec![
            Cell::new(language),
            Cell::new(format!("{:.2}%", percentage)).set_alignment(CellAlignment::Right),
        ]);
    }

    format!("{}\n{}", title, table)
}

/// Language → items lacking it, with a count column
pub fn render_grouping(grouping: &LackingByLanguage, title: &str) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Language", "Missing", "Items"]);

    for (language, items) in grouping {
        table.add_row(vec![
            Cell::new(language),
            Cell::new(items.len()).set_alignment(CellAlignment::Right),
            Cell::new(items.iter().map(String::as_str).collect::<Vec<_>>().join(", ")),
        ]);
    }

    format!("{}\n{}", title, table)
}

/// Render a section with `render` when it holds data, otherwise say why it
/// has none. A missing section is never shown as 0%.
pub fn render_section<T>(
    section: &Fetched<T>,
    title: &str,
    render: impl Fn(&T, &str) -> String,
) -> String {
    match section {
        Fetched::Data(data) => render(data, title),
        Fetched::NoData => format!("{}\nNo data: nothing to look up.", title),
        Fetched::Failed(e) => format!("{}\nNo data: label lookup failed ({}).", title, e),
    }
}
