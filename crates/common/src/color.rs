// Deterministic cursor/selection colours per display name.
//
// Every replica derives the same pair for the same name without coordination.
// Distinct names may share a pair; with 20 slots that is accepted.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ColorPair {
    /// Caret and selection outline.
    pub outline: &'static str,
    /// Selection highlight fill.
    pub fill: &'static str,
}

const fn pair(outline: &'static str, fill: &'static str) -> ColorPair {
    ColorPair { outline, fill }
}

pub const PALETTE: [ColorPair; 20] = [
    pair("#e06c75", "#f6d5d8"),
    pair("#61afef", "#d3e8fb"),
    pair("#98c379", "#e1eed8"),
    pair("#c678dd", "#eedaf5"),
    pair("#d19a66", "#f3e2d2"),
    pair("#56b6c2", "#cfeaee"),
    pair("#e5c07b", "#f8ecd5"),
    pair("#be5046", "#ecd0cd"),
    pair("#2f7fd0", "#cadef3"),
    pair("#3f9f5f", "#cde8d6"),
    pair("#a246c7", "#e6d0ef"),
    pair("#d4671c", "#f5d8c4"),
    pair("#1f9e9e", "#c6e7e7"),
    pair("#b8860b", "#ede1c2"),
    pair("#d6336c", "#f5cbd9"),
    pair("#5c6ac4", "#d6d9f0"),
    pair("#6f9a1d", "#dbe6c6"),
    pair("#8d5a97", "#e2d5e5"),
    pair("#c2410c", "#f0cfc2"),
    pair("#0e7490", "#c2dce3"),
];

/// Pick the colour pair for `display_name`.
///
/// The hash runs over UTF-16 code units so peers written against a
/// UTF-16 string model land on the same slot.
pub fn pick_colors(display_name: &str) -> ColorPair {
    PALETTE[palette_index(display_name)]
}

fn palette_index(display_name: &str) -> usize {
    let hash = display_name
        .encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(i32::from(unit)));
    (hash.unsigned_abs() % PALETTE.len() as u32) as usize
}
