//! Terminal renderer: reprints the whole table on every update.

use std::io::Write;

use lapcounter_core::{Renderer, Snapshot};
use lapcounter_types::formatting::format_row;

pub struct TerminalRenderer;

impl Renderer for TerminalRenderer {
    fn render(&mut self, snapshot: &Snapshot) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out);
        let _ = write!(out, "{}", render_table(snapshot));
        let _ = out.flush();
    }
}

/// Format every row, marking the ones that changed with `*`.
pub fn render_table(snapshot: &Snapshot) -> String {
    let mut table = String::new();
    for row in &snapshot.rows {
        let marker = if snapshot.is_changed(&row.card_id) { '*' } else { ' ' };
        table.push(marker);
        table.push(' ');
        table.push_str(&format_row(
            &row.name,
            row.stage,
            row.lap,
            row.last_punch.as_deref(),
        ));
        table.push('\n');
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use lapcounter_core::CardRow;
    use std::collections::BTreeSet;

    #[test]
    fn test_render_table_marks_changes() {
        let snapshot = Snapshot {
            rows: vec![
                CardRow {
                    card_id: "7".to_string(),
                    name: "Alice".to_string(),
                    stage: 1,
                    lap: 2,
                    last_punch: Some("12:00:05".to_string()),
                },
                CardRow {
                    card_id: "8".to_string(),
                    name: "Bob".to_string(),
                    stage: 0,
                    lap: 0,
                    last_punch: None,
                },
            ],
            changed: BTreeSet::from(["7".to_string()]),
        };

        let table = render_table(&snapshot);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("* Alice"));
        assert!(lines[0].ends_with("| Stage 1 - Lap 2 | Time: 12:00:05"));
        assert!(lines[1].starts_with("  Bob"));
        assert!(lines[1].ends_with("| Stage 0 - Lap 0"));
    }
}
