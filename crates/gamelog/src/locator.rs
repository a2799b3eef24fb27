use scraper::{ElementRef, Html, Node, Selector};

use crate::extractor::{RawRow, RowSection};

/// Containers known to hold the game-log table, highest priority first.
/// An id may name the table itself or an element wrapping it.
pub const CONTAINER_IDS: &[&str] = &[
    "div_batting_gamelogs",
    "batting_gamelogs",
    "div_players_standard_batting",
    "div_pitching_gamelogs",
    "pitching_gamelogs",
];

pub const CLASS_MARKERS: &[&str] = &["game_log", "batting", "stats_table"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Container,
    ClassMarker,
    Comment,
    WidestTable,
}

#[derive(Debug, thiserror::Error)]
#[error("No game-log table found (attempted: {})", .attempted.join(", "))]
pub struct TableNotFound {
    pub attempted: Vec<String>,
}

/// The rows of the table a strategy settled on. Rows are copied out so the
/// result outlives the document (or comment fragment) they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedTable {
    pub strategy: Strategy,
    /// The id or class marker that matched, or `"widest"`.
    pub matched: String,
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

#[derive(Debug, Clone)]
pub struct TableLocator {
    container_ids: Vec<String>,
    class_markers: Vec<String>,
}

impl Default for TableLocator {
    fn default() -> Self {
        Self::new(CONTAINER_IDS, CLASS_MARKERS)
    }
}

impl TableLocator {
    pub fn new(container_ids: &[&str], class_markers: &[&str]) -> Self {
        Self {
            container_ids: container_ids.iter().map(|s| s.to_string()).collect(),
            class_markers: class_markers.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn locate(&self, document: &Html) -> Result<LocatedTable, TableNotFound> {
        if let Some(table) = self.by_container(document, Strategy::Container) {
            return Ok(table);
        }
        if let Some(table) = self.by_class_marker(document) {
            return Ok(table);
        }
        if let Some(table) = self.in_comments(document) {
            return Ok(table);
        }
        if let Some(table) = widest_table(document) {
            log::warn!(
                "Falling back to the widest table ({} columns)",
                table.headers.len()
            );
            return Ok(table);
        }

        let mut attempted: Vec<String> = self
            .container_ids
            .iter()
            .map(|id| format!("#{id}"))
            .collect();
        attempted.extend(self.class_markers.iter().map(|m| format!(".{m}")));
        attempted.push("<!-- comments -->".to_string());
        attempted.push("widest table".to_string());
        Err(TableNotFound { attempted })
    }

    fn by_container(&self, document: &Html, strategy: Strategy) -> Option<LocatedTable> {
        let table_sel = Selector::parse("table").unwrap();

        self.container_ids.iter().find_map(|id| {
            let selector = Selector::parse(&format!(r#"[id="{id}"]"#)).ok()?;
            let container = document.select(&selector).next()?;
            let table = if container.value().name() == "table" {
                container
            } else {
                container.select(&table_sel).next()?
            };
            log::debug!("Located table via container '{}'", id);
            Some(read_table(table, strategy, id))
        })
    }

    fn by_class_marker(&self, document: &Html) -> Option<LocatedTable> {
        let table_sel = Selector::parse("table[class]").unwrap();

        self.class_markers.iter().find_map(|marker| {
            let table = document.select(&table_sel).find(|t| {
                t.value()
                    .attr("class")
                    .is_some_and(|class| class.contains(marker.as_str()))
            })?;
            log::debug!("Located table via class marker '{}'", marker);
            Some(read_table(table, Strategy::ClassMarker, marker))
        })
    }

    /// Some pages ship the table commented out; parse each comment that
    /// looks like markup and look for a known container inside it.
    fn in_comments(&self, document: &Html) -> Option<LocatedTable> {
        document
            .tree
            .nodes()
            .filter_map(|node| match node.value() {
                Node::Comment(comment) => Some(&*comment.comment),
                _ => None,
            })
            .filter(|text| text.contains("<table"))
            .find_map(|text| {
                let fragment = Html::parse_fragment(text);
                self.by_container(&fragment, Strategy::Comment)
            })
    }
}

/// Last resort: the table with the most column headers. Ties go to the
/// first such table in document order.
fn widest_table(document: &Html) -> Option<LocatedTable> {
    let table_sel = Selector::parse("table").unwrap();

    let mut best: Option<(usize, ElementRef)> = None;
    for table in document.select(&table_sel) {
        let width = column_headers(table).len();
        if width > 0 && best.is_none_or(|(w, _)| width > w) {
            best = Some((width, table));
        }
    }

    best.map(|(_, table)| read_table(table, Strategy::WidestTable, "widest"))
}

/// Header labels from the last `<thead>` row (earlier rows are group
/// headings), or the first row's `<th>` cells when there is no `<thead>`.
fn column_headers(table: ElementRef) -> Vec<String> {
    let head_row_sel = Selector::parse("thead tr").unwrap();
    let any_row_sel = Selector::parse("tr").unwrap();
    let th_sel = Selector::parse("th").unwrap();

    let row = table
        .select(&head_row_sel)
        .last()
        .or_else(|| table.select(&any_row_sel).next());

    row.map(|row| {
        row.select(&th_sel)
            .map(|th| th.text().collect::<String>().trim().to_string())
            .collect()
    })
    .unwrap_or_default()
}

fn read_table(table: ElementRef, strategy: Strategy, matched: &str) -> LocatedTable {
    let body_sel = Selector::parse("tbody > tr").unwrap();
    let foot_sel = Selector::parse("tfoot > tr").unwrap();

    let headers = column_headers(table);
    let mut rows: Vec<RawRow> = table
        .select(&body_sel)
        .map(|row| RawRow::from_element(row, &headers, RowSection::Body))
        .collect();
    rows.extend(
        table
            .select(&foot_sel)
            .map(|row| RawRow::from_element(row, &headers, RowSection::Footer)),
    );

    LocatedTable {
        strategy,
        matched: matched.to_string(),
        headers,
        rows,
    }
}
