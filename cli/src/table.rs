//! Plain-text rendering of strength rows.

use std::fmt::Write;

use openings::OpeningStrength;

const HEADER: [&str; 8] = ["Code", "Opening", "Ply", "Colour", "Games", "Engine", "Result", "Lagged"];

fn percent(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.0}%", v * 100.0))
}

pub fn render(rows: &[OpeningStrength]) -> String {
    if rows.is_empty() {
        return "No openings to show.\n".to_string();
    }

    let cells: Vec<[String; 8]> = rows
        .iter()
        .map(|row| {
            [
                row.code.clone(),
                row.name.clone(),
                row.num_moves.to_string(),
                row.colour.to_string(),
                row.occurrence.to_string(),
                percent(row.mean_engine_score),
                percent(row.mean_result),
                percent(row.mean_score_in_n_plies),
            ]
        })
        .collect();

    let mut widths = HEADER.map(str::len);
    for line in &cells {
        for (width, cell) in widths.iter_mut().zip(line) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let header = HEADER.map(str::to_string);
    for line in std::iter::once(&header).chain(&cells) {
        let padded: Vec<String> = line
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect();
        // Writing to a String cannot fail
        let _ = writeln!(out, "{}", padded.join("  ").trim_end());
    }
    out
}
