use falkordb::FalkorValue;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Write statistics reported alongside a result set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryStats {
    pub nodes_created: usize,
    pub nodes_deleted: usize,
    pub relationships_created: usize,
    pub relationships_deleted: usize,
    pub properties_set: usize,
}

impl QueryStats {
    /// Parse FalkorDB statistics lines such as `Nodes created: 2`.
    /// Unknown lines (execution time, cache hints) are ignored.
    pub fn parse<S: AsRef<str>>(lines: &[S]) -> Self {
        let mut stats = QueryStats::default();
        for line in lines {
            let Some((name, value)) = line.as_ref().split_once(':') else {
                continue;
            };
            let Ok(count) = value.trim().parse::<usize>() else {
                continue;
            };
            match name.trim() {
                "Nodes created" => stats.nodes_created = count,
                "Nodes deleted" => stats.nodes_deleted = count,
                "Relationships created" => stats.relationships_created = count,
                "Relationships deleted" => stats.relationships_deleted = count,
                "Properties set" => stats.properties_set = count,
                _ => {}
            }
        }
        stats
    }
}

/// Tabular query result. Every cell is rendered as text; `None` marks a
/// null value or a node without that property.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
    pub stats: QueryStats,
}

impl ResultTable {
    pub fn new(header: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self {
            header,
            rows,
            stats: QueryStats::default(),
        }
    }

    pub fn with_stats(mut self, stats: QueryStats) -> Self {
        self.stats = stats;
        self
    }

    /// Map column name to position.
    pub fn column_index(&self) -> HashMap<&str, usize> {
        self.header
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell at `row`/`column`, `None` when null or out of range.
    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.header.iter().position(|h| h == column)?;
        self.rows.get(row)?.get(idx)?.as_deref()
    }
}

/// Intermediate cell shape: scalars, or the property bag of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Scalar(Option<String>),
    Node(BTreeMap<String, String>),
}

pub fn value_to_text(value: &FalkorValue) -> Option<String> {
    match value {
        FalkorValue::String(s) => Some(s.clone()),
        FalkorValue::I64(i) => Some(i.to_string()),
        FalkorValue::F64(f) => Some(f.to_string()),
        FalkorValue::Bool(b) => Some(b.to_string()),
        FalkorValue::None => None,
        other => Some(format!("{:?}", other)),
    }
}

pub fn value_to_cell(value: FalkorValue) -> Cell {
    match value {
        FalkorValue::Node(node) => Cell::Node(
            node.properties
                .iter()
                .filter_map(|(k, v)| value_to_text(v).map(|text| (k.clone(), text)))
                .collect(),
        ),
        other => Cell::Scalar(value_to_text(&other)),
    }
}

/// Flatten rows into a table. A column holding nodes is expanded into one
/// `<column>.<property>` column per property seen in any row.
pub fn tabulate(header: &[String], rows: Vec<Vec<Cell>>) -> (Vec<String>, Vec<Vec<Option<String>>>) {
    let mut node_keys: Vec<Option<BTreeSet<String>>> = vec![None; header.len()];
    for row in &rows {
        for (i, cell) in row.iter().enumerate().take(header.len()) {
            if let Cell::Node(props) = cell {
                node_keys[i]
                    .get_or_insert_with(BTreeSet::new)
                    .extend(props.keys().cloned());
            }
        }
    }

    let mut out_header = Vec::new();
    for (i, name) in header.iter().enumerate() {
        match &node_keys[i] {
            Some(keys) => out_header.extend(keys.iter().map(|k| format!("{}.{}", name, k))),
            None => out_header.push(name.clone()),
        }
    }

    let out_rows = rows
        .into_iter()
        .map(|row| {
            let mut out = Vec::with_capacity(out_header.len());
            let mut cells = row.into_iter();
            for keys in &node_keys {
                let cell = cells.next();
                match (keys, cell) {
                    (Some(keys), Some(Cell::Node(mut props))) => {
                        out.extend(keys.iter().map(|k| props.remove(k)));
                    }
                    (Some(keys), Some(Cell::Scalar(_))) | (Some(keys), None) => {
                        out.extend(keys.iter().map(|_| None));
                    }
                    (None, Some(Cell::Scalar(value))) => out.push(value),
                    (None, Some(Cell::Node(_))) | (None, None) => out.push(None),
                }
            }
            out
        })
        .collect();

    (out_header, out_rows)
}
