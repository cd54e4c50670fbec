// ABOUTME: Table, CSV, and JSON rendering for listing commands
// ABOUTME: Row-based Tabular trait keeps the models serde-only

use crate::model::{Activity, Board, Job};
use crate::Result;
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Table,
    Json,
    Csv,
}

pub trait Tabular {
    fn headers() -> &'static [&'static str];
    fn row(&self) -> Vec<String>;
}

pub fn render<T: Tabular + Serialize>(items: &[T], format: Format) -> Result<String> {
    match format {
        Format::Json => Ok(serde_json::to_string_pretty(items)?),
        Format::Csv => Ok(render_csv(items)),
        Format::Table => Ok(render_table(items)),
    }
}

fn render_table<T: Tabular>(items: &[T]) -> String {
    let headers = T::headers();
    let rows: Vec<Vec<String>> = items.iter().map(Tabular::row).collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if cell.len() > widths[i] {
                widths[i] = cell.len();
            }
        }
    }

    let mut out = String::new();
    let format_row = |cells: &[String], widths: &[usize]| -> String {
        cells
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{:<width$}", c, width = widths[i]))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let header_cells: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    out.push_str(&format_row(&header_cells, &widths));
    out.push('\n');
    out.push_str(
        &widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("  "),
    );
    for row in &rows {
        out.push('\n');
        out.push_str(&format_row(row, &widths));
    }
    out
}

fn render_csv<T: Tabular>(items: &[T]) -> String {
    let mut out = T::headers().join(",");
    for item in items {
        out.push('\n');
        let cells: Vec<String> = item.row().iter().map(|c| csv_escape(c)).collect();
        out.push_str(&cells.join(","));
    }
    out
}

fn csv_escape(cell: &str) -> String {
    if cell.contains(',') || cell.contains('"') || cell.contains('\n') {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

fn date(value: &Option<DateTime<Utc>>) -> String {
    value
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

impl Tabular for Board {
    fn headers() -> &'static [&'static str] {
        &["ID", "NAME", "CREATED"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.name.clone().unwrap_or_default(),
            date(&self.created_at),
        ]
    }
}

impl Tabular for Job {
    fn headers() -> &'static [&'static str] {
        &["ID", "TITLE", "COMPANY", "STAGE", "UPDATED"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.title.clone().unwrap_or_default(),
            self.company.clone().unwrap_or_default(),
            self.stage.clone().unwrap_or_default(),
            date(&self.updated_at),
        ]
    }
}

impl Tabular for Activity {
    fn headers() -> &'static [&'static str] {
        &["ID", "JOB", "ACTION", "NOTE", "DATE"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.job_id.clone().unwrap_or_default(),
            self.action.clone().unwrap_or_default(),
            self.note.clone().unwrap_or_default(),
            date(&self.created_at),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boards() -> Vec<Board> {
        vec![
            Board {
                id: "brd_1".into(),
                name: Some("2026 Search".into()),
                created_at: None,
            },
            Board {
                id: "brd_2".into(),
                name: None,
                created_at: None,
            },
        ]
    }

    #[test]
    fn test_render_table_aligns_columns() {
        let out = render(&boards(), Format::Table).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[0].starts_with("ID"));
        assert!(lines[0].contains("NAME"));
        assert!(lines[2].contains("2026 Search"));
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_render_json_is_array() {
        let out = render(&boards(), Format::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_render_csv_escapes_commas_and_quotes() {
        let items = vec![Board {
            id: "brd_1".into(),
            name: Some("Infra, \"Platform\"".into()),
            created_at: None,
        }];
        let out = render(&items, Format::Csv).unwrap();
        assert!(out.contains("\"Infra, \"\"Platform\"\"\""));
    }

    #[test]
    fn test_render_empty_list() {
        let out = render(&Vec::<Board>::new(), Format::Table).unwrap();
        assert!(out.starts_with("ID"));
        let json = render(&Vec::<Board>::new(), Format::Json).unwrap();
        assert_eq!(json.trim(), "[]");
    }
}
