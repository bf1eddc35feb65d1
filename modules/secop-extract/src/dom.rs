//! Owned document model for a rendered detail page.
//!
//! The page is parsed once (with the `scraper` crate) into a read-only
//! snapshot of what extraction actually needs: tables in document order,
//! section-heading cells, and the page text. Everything downstream works
//! against this model and never touches parser types, so the HTML library
//! is swappable behind `DetailPage::parse`.

use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;

/// Class the portal puts on section-heading cells.
const HEADING_CLASS: &str = "tttablas";

static TABLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table").expect("valid selector"));
static TR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("valid selector"));
static CELL_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("th, td").expect("valid selector"));
static TEXTAREA_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("textarea").expect("valid selector"));

/// One `<th>`/`<td>` cell.
#[derive(Debug, Clone)]
pub struct Cell {
    /// True for `<th>`.
    pub header: bool,
    /// Space-joined text content.
    pub text: String,
    /// Content of an embedded `<textarea>`, if any. Long contract objects
    /// live in textareas and lose their line breaks in `text`.
    pub textarea: Option<String>,
}

/// One `<tr>`, with two views of its cells: the direct `<th>`/`<td>`
/// children, and every descendant cell (layout tables nest).
#[derive(Debug, Clone, Default)]
pub struct Row {
    pub direct: Vec<Cell>,
    pub all: Vec<Cell>,
}

/// One `<table>` with its position in document order. Nested tables appear
/// both inside their parent's rows and as tables of their own, mirroring a
/// recursive tag scan.
#[derive(Debug, Clone)]
pub struct Table {
    pub order: usize,
    pub rows: Vec<Row>,
}

/// A section-heading cell (`td.tttablas`) with its document-order position.
#[derive(Debug, Clone)]
pub struct Heading {
    pub order: usize,
    pub text: String,
}

/// Parsed snapshot of one detail page.
#[derive(Debug, Clone, Default)]
pub struct DetailPage {
    pub tables: Vec<Table>,
    pub headings: Vec<Heading>,
    /// Whole-page text, space-joined.
    pub text: String,
    /// Individual text nodes, trimmed, in document order.
    pub lines: Vec<String>,
}

impl DetailPage {
    pub fn parse(html: &str) -> Self {
        let doc = Html::parse_document(html);
        let root = doc.root_element();

        let mut tables = Vec::new();
        let mut headings = Vec::new();
        let mut lines = Vec::new();

        for (order, node) in root.descendants().enumerate() {
            if let Some(text) = node.value().as_text() {
                let t = text.trim();
                if !t.is_empty() {
                    lines.push(t.to_string());
                }
                continue;
            }
            let Some(el) = ElementRef::wrap(node) else {
                continue;
            };
            match el.value().name() {
                "table" => tables.push(parse_table(el, order)),
                "td" if el.value().classes().any(|c| c == HEADING_CLASS) => {
                    headings.push(Heading {
                        order,
                        text: element_text(el),
                    });
                }
                _ => {}
            }
        }

        let text = lines.join(" ");
        DetailPage {
            tables,
            headings,
            text,
            lines,
        }
    }

    /// Tables strictly after a document-order position, nearest first,
    /// capped at `limit`.
    pub fn tables_after(&self, order: usize, limit: usize) -> impl Iterator<Item = &Table> {
        self.tables
            .iter()
            .filter(move |t| t.order > order)
            .take(limit)
    }
}

fn parse_table(table: ElementRef<'_>, order: usize) -> Table {
    let rows = table
        .select(&TR_SEL)
        .map(|tr| {
            let direct = tr
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|c| matches!(c.value().name(), "td" | "th"))
                .map(parse_cell)
                .collect();
            let all = tr.select(&CELL_SEL).map(parse_cell).collect();
            Row { direct, all }
        })
        .collect();
    Table { order, rows }
}

fn parse_cell(cell: ElementRef<'_>) -> Cell {
    let textarea = cell.select(&TEXTAREA_SEL).next().map(|ta| {
        ta.text()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    });
    Cell {
        header: cell.value().name() == "th",
        text: element_text(cell),
        textarea,
    }
}

/// Space-joined trimmed text of an element's text nodes.
fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        <html><body>
        <table><tr><td class="tttablas">Información General del Proceso</td></tr></table>
        <table>
            <tr><td>Tipo de Proceso</td><td>Licitación Pública</td></tr>
            <tr><td>Estado del Proceso</td><td>Celebrado</td></tr>
            <tr><td>Objeto</td><td><textarea>Línea uno
Línea dos</textarea></td></tr>
        </table>
        </body></html>"#;

    #[test]
    fn tables_and_headings_in_document_order() {
        let page = DetailPage::parse(SAMPLE);
        assert_eq!(page.tables.len(), 2);
        assert_eq!(page.headings.len(), 1);
        assert!(page.headings[0].order > page.tables[0].order);
        assert!(page.tables[1].order > page.headings[0].order);

        let after: Vec<_> = page.tables_after(page.headings[0].order, 12).collect();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].rows.len(), 3);
    }

    #[test]
    fn cells_capture_text_and_textarea() {
        let page = DetailPage::parse(SAMPLE);
        let rows = &page.tables[1].rows;
        assert_eq!(rows[0].direct[0].text, "Tipo de Proceso");
        assert_eq!(rows[0].direct[1].text, "Licitación Pública");
        let obj = &rows[2].direct[1];
        assert_eq!(obj.textarea.as_deref(), Some("Línea uno\nLínea dos"));
    }

    #[test]
    fn nested_tables_appear_twice() {
        let html = r#"<table><tr><td>outer</td><td>
            <table><tr><td>a</td><td>b</td></tr></table>
        </td></tr></table>"#;
        let page = DetailPage::parse(html);
        assert_eq!(page.tables.len(), 2);
        // Outer table's row scan reaches the nested row too.
        assert_eq!(page.tables[0].rows.len(), 2);
    }

    #[test]
    fn page_text_joins_all_nodes() {
        let page = DetailPage::parse(SAMPLE);
        assert!(page.text.contains("Licitación Pública"));
        assert!(page.lines.iter().any(|l| l == "Celebrado"));
    }
}
