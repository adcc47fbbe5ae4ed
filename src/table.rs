//! Generic tabular view.
//!
//! A [`Table`] projects a slice of records into a declarative [`TableView`]:
//! one header per column and one row per record, or a single spanning row
//! while loading or when there is nothing to show. Hosts turn the view into
//! terminal text, markdown, or JSON; the table itself never does I/O.

use std::collections::HashSet;
use std::fmt::{self, Write};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::warn;

pub const DEFAULT_EMPTY_MESSAGE: &str = "Nenhum dado encontrado";
pub const LOADING_MESSAGE: &str = "Carregando...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Neutral,
    Info,
    Success,
    Warning,
    Danger,
}

/// Displayable content of a single cell. Cells may nest.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DisplayValue {
    #[default]
    Empty,
    Text(String),
    Integer(i64),
    Decimal(f64),
    Date(NaiveDate),
    Flag(bool),
    Badge { label: String, tone: Tone },
    Lines(Vec<DisplayValue>),
    Tags(Vec<String>),
}

impl DisplayValue {
    pub fn badge(label: impl Into<String>, tone: Tone) -> Self {
        DisplayValue::Badge {
            label: label.into(),
            tone,
        }
    }

    pub fn lines<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<DisplayValue>,
    {
        DisplayValue::Lines(values.into_iter().map(Into::into).collect())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            DisplayValue::Empty => true,
            DisplayValue::Text(text) => text.is_empty(),
            DisplayValue::Lines(values) => values.iter().all(DisplayValue::is_empty),
            DisplayValue::Tags(tags) => tags.is_empty(),
            _ => false,
        }
    }

    /// Flattens the value into a single line of text.
    pub fn to_plain(&self) -> String {
        match self {
            DisplayValue::Empty => String::new(),
            DisplayValue::Text(text) => text.clone(),
            DisplayValue::Integer(value) => value.to_string(),
            DisplayValue::Decimal(value) => format!("{value:.1}"),
            DisplayValue::Date(date) => date.format("%d/%m/%Y").to_string(),
            DisplayValue::Flag(true) => "Sim".to_string(),
            DisplayValue::Flag(false) => "Não".to_string(),
            DisplayValue::Badge { label, .. } => label.clone(),
            DisplayValue::Lines(values) => values
                .iter()
                .filter(|value| !value.is_empty())
                .map(DisplayValue::to_plain)
                .collect::<Vec<_>>()
                .join(" / "),
            DisplayValue::Tags(tags) => tags.join(", "),
        }
    }
}

impl fmt::Display for DisplayValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_plain())
    }
}

impl From<String> for DisplayValue {
    fn from(value: String) -> Self {
        DisplayValue::Text(value)
    }
}

impl From<&str> for DisplayValue {
    fn from(value: &str) -> Self {
        DisplayValue::Text(value.to_string())
    }
}

impl From<i64> for DisplayValue {
    fn from(value: i64) -> Self {
        DisplayValue::Integer(value)
    }
}

impl From<i32> for DisplayValue {
    fn from(value: i32) -> Self {
        DisplayValue::Integer(i64::from(value))
    }
}

impl From<u32> for DisplayValue {
    fn from(value: u32) -> Self {
        DisplayValue::Integer(i64::from(value))
    }
}

impl From<usize> for DisplayValue {
    fn from(value: usize) -> Self {
        DisplayValue::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for DisplayValue {
    fn from(value: f64) -> Self {
        DisplayValue::Decimal(value)
    }
}

impl From<NaiveDate> for DisplayValue {
    fn from(value: NaiveDate) -> Self {
        DisplayValue::Date(value)
    }
}

impl From<bool> for DisplayValue {
    fn from(value: bool) -> Self {
        DisplayValue::Flag(value)
    }
}

impl From<Vec<String>> for DisplayValue {
    fn from(value: Vec<String>) -> Self {
        DisplayValue::Tags(value)
    }
}

impl<T: Into<DisplayValue>> From<Option<T>> for DisplayValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(DisplayValue::Empty, Into::into)
    }
}

/// Records addressable by field key.
pub trait Record {
    fn field(&self, key: &str) -> Option<DisplayValue>;
}

pub type Formatter<T> = Box<dyn Fn(&T) -> DisplayValue + Send + Sync>;

pub enum ColumnAccessor<T> {
    Field(&'static str),
    Derive(Formatter<T>),
}

pub struct Column<T> {
    pub header: String,
    pub accessor: ColumnAccessor<T>,
}

impl<T> Column<T> {
    pub fn field(header: impl Into<String>, key: &'static str) -> Self {
        Self {
            header: header.into(),
            accessor: ColumnAccessor::Field(key),
        }
    }

    pub fn derive<F>(header: impl Into<String>, formatter: F) -> Self
    where
        F: Fn(&T) -> DisplayValue + Send + Sync + 'static,
    {
        Self {
            header: header.into(),
            accessor: ColumnAccessor::Derive(Box::new(formatter)),
        }
    }
}

impl<T: Record> Column<T> {
    pub fn resolve(&self, item: &T) -> DisplayValue {
        match &self.accessor {
            ColumnAccessor::Field(key) => item.field(key).unwrap_or_default(),
            ColumnAccessor::Derive(formatter) => formatter(item),
        }
    }
}

type KeyExtractor<T> = Box<dyn Fn(&T) -> String + Send + Sync>;
type RowHandler<T> = Box<dyn Fn(&T) + Send + Sync>;

pub struct Table<T> {
    columns: Vec<Column<T>>,
    key_extractor: KeyExtractor<T>,
    on_row_click: Option<RowHandler<T>>,
    is_loading: bool,
    empty_message: Option<String>,
}

impl<T: Record> Table<T> {
    pub fn new<K>(columns: Vec<Column<T>>, key_extractor: K) -> Self
    where
        K: Fn(&T) -> String + Send + Sync + 'static,
    {
        Self {
            columns,
            key_extractor: Box::new(key_extractor),
            on_row_click: None,
            is_loading: false,
            empty_message: None,
        }
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn loading(mut self, is_loading: bool) -> Self {
        self.is_loading = is_loading;
        self
    }

    pub fn empty_message(mut self, message: impl Into<String>) -> Self {
        self.empty_message = Some(message.into());
        self
    }

    pub fn on_row_click<F>(mut self, handler: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.on_row_click = Some(Box::new(handler));
        self
    }

    pub fn key_of(&self, item: &T) -> String {
        (self.key_extractor)(item)
    }

    /// Projects `data` into a view. Loading wins over empty, empty wins over rows.
    /// Rows keep the order of `data`.
    pub fn render(&self, data: &[T]) -> TableView {
        let headers = self.columns.iter().map(|c| c.header.clone()).collect();
        let span = self.columns.len();

        let body = if self.is_loading {
            TableBody::Loading { span }
        } else if data.is_empty() {
            TableBody::Empty {
                message: self
                    .empty_message
                    .clone()
                    .unwrap_or_else(|| DEFAULT_EMPTY_MESSAGE.to_string()),
                span,
            }
        } else {
            let mut seen = HashSet::with_capacity(data.len());
            let mut warned = false;
            let mut rows = Vec::with_capacity(data.len());

            for item in data {
                let key = self.key_of(item);
                if !seen.insert(key.clone()) && !warned {
                    warn!(key = %key, "duplicate row key in table");
                    warned = true;
                }
                let cells = self.columns.iter().map(|c| c.resolve(item)).collect();
                rows.push(TableRow { key, cells });
            }

            TableBody::Rows { rows }
        };

        TableView { headers, body }
    }

    /// Activates the first row whose key equals `key`, handing the full record
    /// to the row handler. Returns whether a handler ran.
    pub fn activate(&self, data: &[T], key: &str) -> bool {
        if self.is_loading {
            return false;
        }
        let Some(handler) = &self.on_row_click else {
            return false;
        };

        match data.iter().find(|item| self.key_of(item) == key) {
            Some(item) => {
                handler(item);
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub key: String,
    pub cells: Vec<DisplayValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TableBody {
    Loading { span: usize },
    Empty { message: String, span: usize },
    Rows { rows: Vec<TableRow> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableView {
    pub headers: Vec<String>,
    pub body: TableBody,
}

impl TableView {
    /// Number of rendered body rows; loading and empty states count as one.
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn row_count(&self) -> usize {
        match &self.body {
            TableBody::Loading { .. } | TableBody::Empty { .. } => 1,
            TableBody::Rows { rows } => rows.len(),
        }
    }

    pub fn rows(&self) -> &[TableRow] {
        match &self.body {
            TableBody::Rows { rows } => rows,
            _ => &[],
        }
    }

    fn banner(&self) -> Option<&str> {
        match &self.body {
            TableBody::Loading { .. } => Some(LOADING_MESSAGE),
            TableBody::Empty { message, .. } => Some(message.as_str()),
            TableBody::Rows { .. } => None,
        }
    }

    fn plain_rows(&self) -> Vec<Vec<String>> {
        self.rows()
            .iter()
            .map(|row| row.cells.iter().map(DisplayValue::to_plain).collect())
            .collect()
    }

    /// Aligned columns for the terminal.
    pub fn to_text(&self) -> String {
        let rows = self.plain_rows();
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let mut output = String::new();
        if !self.headers.is_empty() {
            let _ = writeln!(output, "{}", join_padded(&self.headers, &widths));
            let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
            let _ = writeln!(output, "{}", rule.join("-+-"));
        }

        match self.banner() {
            Some(message) => {
                let _ = writeln!(output, "{message}");
            }
            None => {
                for row in &rows {
                    let _ = writeln!(output, "{}", join_padded(row, &widths));
                }
            }
        }

        output
    }

    pub fn to_markdown(&self) -> String {
        let mut output = String::new();

        if !self.headers.is_empty() {
            let headers: Vec<String> = self.headers.iter().map(|h| escape_markdown(h)).collect();
            let _ = writeln!(output, "| {} |", headers.join(" | "));
            let rule = vec!["---"; self.headers.len()];
            let _ = writeln!(output, "| {} |", rule.join(" | "));
        }

        match self.banner() {
            Some(message) => {
                let mut cells = vec![String::new(); self.headers.len().max(1)];
                cells[0] = escape_markdown(message);
                let _ = writeln!(output, "| {} |", cells.join(" | "));
            }
            None => {
                for row in self.plain_rows() {
                    let cells: Vec<String> = row.iter().map(|c| escape_markdown(c)).collect();
                    let _ = writeln!(output, "| {} |", cells.join(" | "));
                }
            }
        }

        output
    }
}

fn join_padded(cells: &[String], widths: &[usize]) -> String {
    cells
        .iter()
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join(" | ")
        .trim_end()
        .to_string()
}

fn escape_markdown(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}
