//! Partitions the tape into named, colored sections and decodes each one into the
//! value it holds.
//!
//! The first and last cells are sentinels and are never scanned. Separator cells
//! (`5`) belong to no section. A marker cell closes the open section and opens a
//! new one starting at the next cell: `2`, `3` and `4` open the reserved registers
//! `A`, `B` and `C`, while `6` opens a generic storage section. Markers directly
//! followed by a separator open nothing, and sections that end up empty are dropped.
//!
//! Storage sections are numbered in reverse scan order, so the leftmost one gets
//! the highest number and the rightmost one is `S0`.

use serde::{Deserialize, Serialize};

use crate::types::{Symbol, MARKER_A, MARKER_B, MARKER_C, ONE, SEPARATOR, STORAGE_MARKER, ZERO};

/// Value shown for a section that holds anything but binary digits.
pub const UNDECODABLE: &str = "x";

/// Display color of a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionColor {
    Blue,
    Red,
    Green,
    Purple,
}

/// A contiguous, inclusive range of the tape holding one logical value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapeSection {
    pub start: usize,
    pub end: usize,
    pub name: String,
    pub color: SectionColor,
    /// Decimal value of the binary contents, or `"x"`.
    pub value: String,
}

impl TapeSection {
    /// Opens an empty section whose first cell will be `start`.
    fn open(name: &str, color: SectionColor, start: usize) -> Self {
        Self {
            start,
            end: start - 1,
            name: name.to_string(),
            color,
            value: UNDECODABLE.to_string(),
        }
    }

    fn is_storage(&self) -> bool {
        self.color == SectionColor::Blue
    }

    fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

/// Returns the name and color of the section opened by `symbol`, if it is a marker.
fn marker(symbol: Symbol) -> Option<(&'static str, SectionColor)> {
    match symbol {
        MARKER_A => Some(("A", SectionColor::Red)),
        MARKER_B => Some(("B", SectionColor::Green)),
        MARKER_C => Some(("C", SectionColor::Purple)),
        STORAGE_MARKER => Some(("S", SectionColor::Blue)),
        _ => None,
    }
}

/// Scans the tape and returns its section layout, in tape order.
///
/// Values are left undecoded; call [`update_sections`] afterwards.
pub fn build_sections(tape: &[Symbol]) -> Vec<TapeSection> {
    if tape.len() < 3 {
        return Vec::new();
    }

    let mut sections = vec![TapeSection::open("S", SectionColor::Blue, 1)];

    for i in 1..tape.len() - 1 {
        let symbol = tape[i];

        if symbol == SEPARATOR {
            continue;
        }

        match marker(symbol) {
            Some(_) if tape[i + 1] == SEPARATOR => continue,
            Some((name, color)) => sections.push(TapeSection::open(name, color, i + 1)),
            None => {
                if let Some(section) = sections.last_mut() {
                    section.end = i;
                }
            }
        }
    }

    sections.retain(|section| !section.is_empty());

    let mut remaining = sections.iter().filter(|s| s.is_storage()).count();
    for section in sections.iter_mut().filter(|s| s.is_storage()) {
        remaining -= 1;
        section.name = format!("S{remaining}");
    }

    sections
}

/// Recomputes the decoded value of every section from the current tape.
///
/// The layout itself is not rebuilt.
pub fn update_sections(sections: &mut [TapeSection], tape: &[Symbol]) {
    for section in sections.iter_mut() {
        section.value = tape
            .get(section.start..=section.end)
            .map(decode)
            .unwrap_or_else(|| UNDECODABLE.to_string());
    }
}

/// Decodes a run of cells as a big-endian binary number in decimal.
///
/// Any cell other than 0 or 1 makes the whole run undecodable. Runs of any length
/// are converted exactly.
pub fn decode(cells: &[Symbol]) -> String {
    if cells.is_empty() || cells.iter().any(|&c| c != ZERO && c != ONE) {
        return UNDECODABLE.to_string();
    }

    // Little-endian decimal digits; doubled and incremented bit by bit.
    let mut digits: Vec<u8> = vec![0];
    for &bit in cells {
        let mut carry = bit as u8;
        for digit in digits.iter_mut() {
            let doubled = *digit * 2 + carry;
            *digit = doubled % 10;
            carry = doubled / 10;
        }
        if carry > 0 {
            digits.push(carry);
        }
    }

    digits.iter().rev().map(|d| char::from(b'0' + d)).collect()
}
