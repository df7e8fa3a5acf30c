// =============================================================================
// MATRIX MODULE
// =============================================================================
// Turns delimited spreadsheet exports into a rectangular-ish matrix of cells.
//
// RULES:
// - Comma separates fields, `"` quotes a field
// - Inside quotes, `""` is a literal quote
// - CR, LF and CRLF end a row (only outside quotes)
// - A trailing row without a line terminator is still emitted
//
// There are no error conditions. A stray quote just flips the quote state,
// so broken exports degrade into odd cells instead of failures.
// =============================================================================

/// Parse comma-separated text into rows of cells.
pub fn parse(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;

    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                if in_quotes && chars.peek() == Some(&'"') {
                    cell.push('"');
                    chars.next();
                } else {
                    in_quotes = !in_quotes;
                }
            }
            ',' if !in_quotes => row.push(std::mem::take(&mut cell)),
            '\r' | '\n' if !in_quotes => {
                if ch == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                row.push(std::mem::take(&mut cell));
                rows.push(std::mem::take(&mut row));
            }
            _ => cell.push(ch),
        }
    }

    if !cell.is_empty() || !row.is_empty() {
        row.push(cell);
        rows.push(row);
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_plain_rows() {
        assert_eq!(parse("a,b,c\n1,2,3"), m(&[&["a", "b", "c"], &["1", "2", "3"]]));
    }

    #[test]
    fn test_all_line_endings_terminate_rows() {
        let parsed = parse("a\rb\nc\r\nd");
        assert_eq!(parsed, m(&[&["a"], &["b"], &["c"], &["d"]]));
    }

    #[test]
    fn test_quoted_fields_keep_delimiters_and_escaped_quotes() {
        let parsed = parse("\"Hall, Red\",\"say \"\"hi\"\"\",\"two\nlines\"\n");
        assert_eq!(parsed, m(&[&["Hall, Red", "say \"hi\"", "two\nlines"]]));
    }

    #[test]
    fn test_trailing_newline_does_not_emit_empty_row() {
        assert_eq!(parse("a,b\n"), m(&[&["a", "b"]]));
    }

    #[test]
    fn test_trailing_empty_field_is_kept() {
        assert_eq!(parse("a,"), m(&[&["a", ""]]));
    }

    #[test]
    fn test_empty_input() {
        assert!(parse("").is_empty());
    }

    #[test]
    fn test_unbalanced_quote_degrades_gracefully() {
        // The open quote swallows the rest of the text into one cell
        assert_eq!(parse("a,\"b,c\nd"), m(&[&["a", "b,c\nd"]]));
    }

    #[test]
    fn test_round_trip_through_quoting_writer() {
        let original = m(&[
            &["Task", "Owner", "Show A"],
            &["Sound check", "Jo", "Done"],
            &["Focus", "", "Pending"],
        ]);

        let mut writer = csv::WriterBuilder::new()
            .quote_style(csv::QuoteStyle::Always)
            .from_writer(Vec::new());
        for row in &original {
            writer.write_record(row).unwrap();
        }
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();

        assert_eq!(parse(&text), original);
    }
}
