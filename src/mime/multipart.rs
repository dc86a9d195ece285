//! Multipart body splitting.

/// Split a multipart body on `--boundary` delimiter lines.
///
/// Preamble and epilogue are discarded. The line break preceding a delimiter
/// belongs to the delimiter and is not part of the section. A body with no
/// closing delimiter keeps its last open section.
pub(crate) fn split_sections<'a>(body: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();

    let mut sections = Vec::new();
    let mut open: Option<usize> = None;
    let mut pos = 0;

    while pos < body.len() {
        let newline = body[pos..].iter().position(|&b| b == b'\n').map(|i| pos + i);
        let next = newline.map_or(body.len(), |nl| nl + 1);
        let line = trim_line_end(&body[pos..newline.unwrap_or(body.len())]);

        if let Some(rest) = line.strip_prefix(delimiter) {
            let closing = rest == b"--";
            if rest.is_empty() || closing {
                if let Some(start) = open {
                    sections.push(strip_line_break(&body[start..pos]));
                }
                if closing {
                    return sections;
                }
                open = Some(next);
            }
        }
        pos = next;
    }

    if let Some(start) = open {
        sections.push(&body[start.min(body.len())..]);
    }
    sections
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|b| !matches!(b, b'\r' | b' ' | b'\t'))
        .map_or(0, |i| i + 1);
    &line[..end]
}

fn strip_line_break(section: &[u8]) -> &[u8] {
    section
        .strip_suffix(b"\r\n")
        .or_else(|| section.strip_suffix(b"\n"))
        .unwrap_or(section)
}
