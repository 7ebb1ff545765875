use regex::Regex;
use serde::Serialize;

/// One candidate development position and the analysis backing it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Position {
    pub title: String,
    pub analysis: Vec<String>,
}

/// Parse `Position N: title` headings, each followed by `- ` analysis bullets.
///
/// Markdown emphasis around headings is ignored. Bullets before the first
/// heading and headings without a title are dropped. Repeated titles merge.
pub fn parse_positions(text: &str) -> Vec<Position> {
    let Ok(heading_re) = Regex::new(r"^(?:Position|发展定位)\s*\d+\s*[:：]\s*(.+)$") else {
        return Vec::new();
    };
    let mut positions: Vec<Position> = Vec::new();
    let mut current: Option<usize> = None;

    for raw in text.lines() {
        let line = raw.trim().trim_matches(|c: char| c == '*' || c == '#').trim();

        if let Some(caps) = heading_re.captures(line) {
            let title = caps[1].trim().trim_matches('*').trim().to_string();
            if title.is_empty() {
                current = None;
                continue;
            }
            current = match positions.iter().position(|p| p.title == title) {
                Some(idx) => Some(idx),
                None => {
                    positions.push(Position {
                        title,
                        analysis: Vec::new(),
                    });
                    Some(positions.len() - 1)
                }
            };
            continue;
        }

        let Some(idx) = current else {
            continue;
        };
        if let Some(item) = raw.trim().strip_prefix("- ") {
            let item = item.trim();
            if !item.is_empty() {
                positions[idx].analysis.push(item.to_string());
            }
        }
    }

    positions
}
