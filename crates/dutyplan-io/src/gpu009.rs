//! GPU009 duty-roster export.
//!
//! One line per (slot, teacher), CRLF-terminated, semicolon-separated with
//! a trailing semicolon:
//!
//! ```text
//! "<floor-name>";"<teacher-abbrev>";<weekday 1..5>;<gpu-break-index>;1;
//! ```
//!
//! The GPU break index interleaves with lesson hours:
//! `(break_index - 1) * 2 + 1`, yielding 1, 3, 5, 7 for breaks 1..=4.

/// One duty roster entry ready for export.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DutyLine {
    pub floor_name: String,
    /// Stored abbreviation; the export falls back to the last name
    pub abbreviation: Option<String>,
    pub last_name: String,
    /// 0 = Monday .. 4 = Friday
    pub weekday: u8,
    pub break_index: u8,
}

/// Break index in GPU numbering (1, 3, 5, 7)
pub fn gpu_break_index(break_index: u8) -> u8 {
    (break_index - 1) * 2 + 1
}

/// Abbreviation with the documented fallback: the first three letters of
/// the last name, uppercased.
fn effective_abbreviation(line: &DutyLine) -> String {
    match &line.abbreviation {
        Some(abbreviation) if !abbreviation.is_empty() => abbreviation.clone(),
        _ => line.last_name.chars().take(3).collect::<String>().to_uppercase(),
    }
}

/// Render the full export text; lines arrive in roster order.
pub fn render_gpu009(lines: &[DutyLine]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(&format!(
            "\"{}\";\"{}\";{};{};1;\r\n",
            line.floor_name,
            effective_abbreviation(line),
            line.weekday + 1,
            gpu_break_index(line.break_index),
        ));
    }
    out
}
