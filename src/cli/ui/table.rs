use std::fmt::{self, Display, Formatter};

use tabled::builder::Builder;
use tabled::settings::object::{Columns, Object, Rows};
use tabled::settings::{Alignment, Style as TableStyle};

use super::painter::Painter;

/// Rounded table rendered through `Display`.
#[derive(Debug)]
pub(crate) struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    numeric_columns: Vec<usize>,
}

impl Table {
    pub(crate) fn grid(
        headers: impl IntoIterator<Item = impl Into<String>>,
        rows: Vec<Vec<String>>,
    ) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows,
            numeric_columns: Vec::new(),
        }
    }

    /// Field/value pairs with muted field names.
    pub(crate) fn key_value(painter: &Painter, rows: Vec<(&str, String)>) -> Self {
        let records = rows
            .into_iter()
            .map(|(field, value)| vec![painter.muted(field), value])
            .collect();
        Self::grid(["field", "value"], records)
    }

    /// Right-aligns the data cells of `columns`; headers stay left-aligned.
    pub(crate) fn with_numeric_columns(mut self, columns: impl IntoIterator<Item = usize>) -> Self {
        self.numeric_columns.extend(columns);
        self
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut builder = Builder::default();
        builder.push_record(&self.headers);
        for row in &self.rows {
            builder.push_record(row);
        }
        let mut table = builder.build();
        table.with(TableStyle::rounded());
        for &column in &self.numeric_columns {
            table.modify(
                Columns::new(column..=column).not(Rows::first()),
                Alignment::right(),
            );
        }
        write!(f, "{table}")
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;

    #[test]
    fn numeric_columns_align_right_below_the_header() {
        let table = Table::grid(
            ["#", "event"],
            vec![
                vec!["9".into(), "measured".into()],
                vec!["10".into(), "calibrated".into()],
            ],
        )
        .with_numeric_columns([0]);

        assert_snapshot!(table.to_string(), @r"
        ╭────┬────────────╮
        │ #  │ event      │
        ├────┼────────────┤
        │  9 │ measured   │
        │ 10 │ calibrated │
        ╰────┴────────────╯
        ");
    }

    #[test]
    fn key_value_table_renders_field_value_pairs() {
        let painter = Painter::new(false);
        let rendered = Table::key_value(
            &painter,
            vec![("port", "COM3".into()), ("baud_rate", "9600".into())],
        )
        .to_string();

        assert!(rendered.contains("│ field     │ value │"));
        assert!(rendered.contains("│ baud_rate │ 9600  │"));
    }
}
