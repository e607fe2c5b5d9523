//! Plain column tables for list commands.

use console::{Alignment, measure_text_width, pad_str};

/// A table with a header row, printed with space-separated padded columns.
#[derive(Debug, Clone, Default)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Adds a row. Missing cells render empty; extra cells are dropped.
    pub fn row<I, S>(&mut self, cells: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut cells: Vec<String> = cells.into_iter().map(Into::into).collect();
        cells.resize(self.headers.len(), String::new());
        self.rows.push(cells);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn render(&self) -> String {
        let widths: Vec<usize> = (0..self.headers.len())
            .map(|col| {
                std::iter::once(&self.headers[col])
                    .chain(self.rows.iter().map(|r| &r[col]))
                    .map(|cell| measure_text_width(cell))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let mut out = String::new();
        let header: Vec<String> = self
            .headers
            .iter()
            .map(|h| console::style(h).bold().to_string())
            .collect();
        for cells in std::iter::once(&header).chain(self.rows.iter()) {
            let line: Vec<_> = cells
                .iter()
                .zip(&widths)
                .map(|(cell, width)| pad_str(cell, *width, Alignment::Left, None))
                .collect();
            out.push_str(line.join("  ").trim_end());
            out.push('\n');
        }
        out
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_are_aligned() {
        console::set_colors_enabled(false);
        let mut table = Table::new(["NAME", "OS"]);
        table.row(["Pixel 5", "11"]).row(["Galaxy S21 Ultra", "12"]);

        assert_eq!(
            table.render(),
            "NAME              OS\nPixel 5           11\nGalaxy S21 Ultra  12\n"
        );
    }

    #[test]
    fn test_short_rows_are_padded() {
        console::set_colors_enabled(false);
        let mut table = Table::new(["A", "B", "C"]);
        table.row(["1"]);

        assert_eq!(table.render(), "A  B  C\n1\n");
    }
}
