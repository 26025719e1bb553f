//! Plain-text tables with ASCII borders.

/// A table of multi-line cells.
///
/// Leading columns may be merged: when a row repeats the values of the previous row in those
/// columns, the repeated cells are left blank and no separator is drawn between the two rows.
#[derive(Clone, Debug, Default)]
pub struct TextTable {
    header: Vec<String>,
    rows: Vec<Option<Vec<String>>>,
    merged_columns: usize,
}

impl TextTable {
    pub fn new<I, S>(header: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            header: header.into_iter().map(Into::into).collect(),
            rows: vec![],
            merged_columns: 0,
        }
    }

    pub fn with_merged_columns(mut self, n: usize) -> Self {
        self.merged_columns = n;
        self
    }

    /// Appends a row. Missing cells are rendered empty and extra cells are dropped.
    pub fn push_row<I, S>(&mut self, row: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut row = row.into_iter().map(Into::into).collect::<Vec<_>>();
        row.resize(self.header.len(), String::new());
        self.rows.push(Some(row));
    }

    /// Appends an empty row, which also resets column merging.
    pub fn push_blank(&mut self) {
        self.rows.push(None);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn render(&self) -> String {
        let blank = vec![String::new(); self.header.len()];
        let mut rows = Vec::with_capacity(self.rows.len());
        let mut previous: Option<&Vec<String>> = None;
        for row in &self.rows {
            match row {
                None => {
                    rows.push((false, blank.clone()));
                    previous = None;
                }
                Some(cells) => {
                    let merged = previous
                        .map(|prev| {
                            cells
                                .iter()
                                .zip(prev)
                                .take(self.merged_columns)
                                .take_while(|(a, b)| a == b)
                                .count()
                        })
                        .unwrap_or(0);
                    let mut shown = cells.clone();
                    for cell in shown.iter_mut().take(merged) {
                        cell.clear();
                    }
                    rows.push((merged > 0, shown));
                    previous = Some(cells);
                }
            }
        }

        let mut widths = self.header.iter().map(|h| width(h)).collect::<Vec<_>>();
        for (_, cells) in &rows {
            for (w, cell) in widths.iter_mut().zip(cells) {
                *w = (*w).max(width(cell));
            }
        }

        let border = {
            let mut line = String::from("+");
            for w in &widths {
                line.push_str(&"-".repeat(w + 2));
                line.push('+');
            }
            line
        };

        let mut out = vec![border.clone()];
        out.extend(render_row(&self.header, &widths));
        out.push(border.clone());
        for (i, (continues, cells)) in rows.iter().enumerate() {
            if i > 0 && !continues {
                out.push(border.clone());
            }
            out.extend(render_row(cells, &widths));
        }
        if !rows.is_empty() {
            out.push(border);
        }
        out.join("\n")
    }
}

fn width(cell: &str) -> usize {
    cell.lines().map(|l| l.chars().count()).max().unwrap_or(0)
}

fn render_row(cells: &[String], widths: &[usize]) -> Vec<String> {
    let height = cells.iter().map(|c| c.lines().count()).max().unwrap_or(0).max(1);
    (0..height)
        .map(|i| {
            let mut line = String::from("|");
            for (cell, w) in cells.iter().zip(widths) {
                let text = cell.lines().nth(i).unwrap_or("");
                line.push(' ');
                line.push_str(text);
                line.push_str(&" ".repeat(w - text.chars().count() + 1));
                line.push('|');
            }
            line
        })
        .collect()
}
