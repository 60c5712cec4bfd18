//! Office document text: DOCX paragraphs and XLSX sheets.
//!
//! Both readers are lenient: a file that cannot be parsed is logged at error
//! level and yields empty text rather than failing the caller, because a
//! broken attachment should not abort a batch of otherwise good media.

use calamine::{Data, Range, Reader};
use std::io::Cursor;
use tracing::{debug, error};

/// Paragraph text of a DOCX, one paragraph per line.
pub fn docx_text(bytes: &[u8]) -> String {
    let doc = match docx_rs::read_docx(bytes) {
        Ok(doc) => doc,
        Err(e) => {
            error!("DOCX could not be read: {}", e);
            return String::new();
        }
    };

    let mut content = String::new();
    for child in doc.document.children {
        if let docx_rs::DocumentChild::Paragraph(p) = child {
            for child in p.children {
                if let docx_rs::ParagraphChild::Run(run) = child {
                    for child in run.children {
                        if let docx_rs::RunChild::Text(t) = child {
                            content.push_str(&t.text);
                        }
                    }
                }
            }
            content.push('\n');
        }
    }
    debug!("DOCX: {} chars", content.len());
    content
}

/// Every sheet of a workbook as an aligned text table under a
/// `Sheet: <name>` header, sheets separated by a blank line.
pub fn xlsx_text(bytes: &[u8]) -> String {
    let mut workbook = match calamine::open_workbook_auto_from_rs(Cursor::new(bytes)) {
        Ok(wb) => wb,
        Err(e) => {
            error!("XLSX could not be read: {}", e);
            return String::new();
        }
    };

    let mut sheets = Vec::new();
    for name in workbook.sheet_names().to_vec() {
        match workbook.worksheet_range(&name) {
            Ok(range) => sheets.push(format_sheet(&name, &range)),
            Err(e) => error!("XLSX sheet '{}' could not be read: {}", name, e),
        }
    }
    debug!("XLSX: {} sheets", sheets.len());
    sheets.join("\n\n")
}

/// Render one sheet with every column padded to its widest cell.
pub fn format_sheet(name: &str, range: &Range<Data>) -> String {
    let rows: Vec<Vec<String>> = range
        .rows()
        .map(|row| row.iter().map(cell_text).collect::<Vec<_>>())
        .filter(|row| !row.iter().all(String::is_empty))
        .collect();

    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut widths = vec![0usize; columns];
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let mut out = format!("Sheet: {name}");
    for row in &rows {
        let line = row
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{:<width$}", cell, width = widths[i]))
            .collect::<Vec<_>>()
            .join("  ");
        out.push('\n');
        out.push_str(line.trim_end());
    }
    out
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docx_rs::{Docx, Paragraph, Run};

    #[test]
    fn docx_paragraphs_become_lines() {
        let mut buf = Cursor::new(Vec::new());
        Docx::new()
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text("Contrato")))
            .add_paragraph(
                Paragraph::new()
                    .add_run(Run::new().add_text("Cláusula"))
                    .add_run(Run::new().add_text("1ª")),
            )
            .build()
            .pack(&mut buf)
            .unwrap();
        assert_eq!(docx_text(buf.get_ref()), "Contrato\nCláusula1ª\n");
    }

    #[test]
    fn unreadable_office_files_yield_empty_text() {
        assert_eq!(docx_text(b"not a zip"), "");
        assert_eq!(xlsx_text(b"not a zip"), "");
    }

    #[test]
    fn sheet_columns_are_aligned() {
        let mut range = Range::new((0, 0), (2, 1));
        range.set_value((0, 0), Data::String("Item".into()));
        range.set_value((0, 1), Data::String("Qty".into()));
        range.set_value((1, 0), Data::String("Parafuso".into()));
        range.set_value((1, 1), Data::Int(12));
        range.set_value((2, 0), Data::String("Porca".into()));
        range.set_value((2, 1), Data::Float(3.5));

        let text = format_sheet("Estoque", &range);
        assert_eq!(
            text,
            "Sheet: Estoque\nItem      Qty\nParafuso  12\nPorca     3.5"
        );
    }

    #[test]
    fn empty_rows_are_skipped() {
        let mut range = Range::new((0, 0), (2, 0));
        range.set_value((0, 0), Data::String("a".into()));
        range.set_value((2, 0), Data::String("b".into()));
        assert_eq!(format_sheet("S", &range), "Sheet: S\na\nb");
    }
}
