//! Plate grammar of the target jurisdiction.
//!
//! Everything jurisdiction-specific lives in [`PlateGrammar`] as plain data:
//! the two glyph-confusion tables, the province-code set and the per-length
//! format templates. Swapping grammars means loading a different value, not
//! changing code.

use serde::{Deserialize, Serialize};

use crate::types::VehicleClass;

/// Which format table row family applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlateLayout {
    Car,
    Motorcycle,
    Motorcycle50cc,
}

/// One format table row. `#` in `template` takes the next corrected character.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatRule {
    pub layout: PlateLayout,
    pub len: usize,
    pub template: String,
}

impl FormatRule {
    fn new(layout: PlateLayout, len: usize, template: &str) -> Self {
        Self { layout, len, template: template.to_string() }
    }

    fn apply(&self, text: &str) -> Option<String> {
        let mut chars = text.chars();
        let mut out = String::with_capacity(self.template.len());
        for t in self.template.chars() {
            if t == '#' {
                out.push(chars.next()?);
            } else {
                out.push(t);
            }
        }
        Some(out)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlateGrammar {
    /// Applied where a digit is required.
    pub letter_to_digit: Vec<(char, char)>,
    /// Applied where a series letter is required.
    pub digit_to_letter: Vec<(char, char)>,
    /// Inclusive province-code range.
    pub province_range: (u32, u32),
    pub excluded_provinces: Vec<u32>,
    pub formats: Vec<FormatRule>,
    /// Hard cap on the corrected string.
    pub max_len: usize,
    /// Shorter strings are left uncorrected.
    pub min_correctable_len: usize,
}

impl Default for PlateGrammar {
    fn default() -> Self {
        use PlateLayout::*;
        Self {
            letter_to_digit: vec![
                ('I', '1'),
                ('L', '1'),
                ('T', '1'),
                ('O', '0'),
                ('Q', '0'),
                ('D', '0'),
                ('U', '0'),
                ('B', '8'),
                ('E', '8'),
                ('S', '5'),
                ('Z', '2'),
                ('R', '2'),
                ('G', '6'),
                ('C', '6'),
                ('A', '4'),
                ('J', '3'),
            ],
            digit_to_letter: vec![
                ('0', 'D'),
                ('1', 'I'),
                ('2', 'Z'),
                ('3', 'B'),
                ('4', 'A'),
                ('5', 'S'),
                ('6', 'G'),
                ('8', 'B'),
            ],
            province_range: (11, 99),
            excluded_provinces: vec![13],
            formats: vec![
                FormatRule::new(Car, 7, "###-####"),
                FormatRule::new(Car, 8, "###-###.##"),
                FormatRule::new(Car, 9, "###-###.##"),
                FormatRule::new(Motorcycle, 7, "##-## ###"),
                FormatRule::new(Motorcycle, 8, "##-## ####"),
                FormatRule::new(Motorcycle, 9, "##-## ###.##"),
                FormatRule::new(Motorcycle50cc, 8, "##-## ####"),
                FormatRule::new(Motorcycle50cc, 9, "##-## ###.##"),
            ],
            max_len: 9,
            min_correctable_len: 6,
        }
    }
}

/// Uppercase and keep only `A-Z0-9`.
pub fn clean(text: &str) -> String {
    text.chars()
        .map(|c| c.to_ascii_uppercase())
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        .collect()
}

fn lookup(table: &[(char, char)], c: char) -> char {
    table
        .iter()
        .find(|(from, _)| *from == c)
        .map_or(c, |(_, to)| *to)
}

impl PlateGrammar {
    /// Vehicle class and 50cc flag from the reading-ordered lines.
    pub fn classify(&self, lines: &[String]) -> (VehicleClass, bool) {
        match lines {
            [] => (VehicleClass::Unknown, false),
            [_] => (VehicleClass::Car, false),
            [first, ..] => {
                let first: Vec<char> = clean(first).chars().collect();
                let letter = |i: usize| first[i].is_ascii_uppercase();
                match first.len() {
                    0..=2 => (VehicleClass::Unknown, false),
                    3 => (VehicleClass::Car, false),
                    4 => (VehicleClass::Motorcycle, letter(2) && letter(3)),
                    n => (VehicleClass::Motorcycle, letter(n - 2) && letter(n - 1)),
                }
            }
        }
    }

    /// Positional glyph correction of an already cleaned string.
    pub fn correct(&self, clean: &str, is_50cc: bool) -> String {
        let mut chars: Vec<char> = clean.chars().collect();
        if chars.len() < self.min_correctable_len {
            return clean.to_string();
        }

        for c in &mut chars[..2] {
            *c = lookup(&self.letter_to_digit, *c);
        }
        chars[2] = lookup(&self.digit_to_letter, chars[2]);

        let numeric_from = if is_50cc {
            chars[3] = lookup(&self.digit_to_letter, chars[3]);
            4
        } else {
            3
        };
        for c in &mut chars[numeric_from..] {
            *c = lookup(&self.letter_to_digit, *c);
        }

        chars.into_iter().collect()
    }

    pub fn is_valid_province(&self, code: u32) -> bool {
        let (lo, hi) = self.province_range;
        (lo..=hi).contains(&code) && !self.excluded_provinces.contains(&code)
    }

    /// Whether the first two characters form a valid province code.
    pub fn province_valid(&self, corrected: &str) -> bool {
        let prefix: String = corrected.chars().take(2).collect();
        prefix.len() == 2
            && prefix
                .parse::<u32>()
                .map_or(false, |code| self.is_valid_province(code))
    }

    /// Reinsert separators. Lengths without a table entry come back unformatted.
    pub fn format(&self, corrected: &str, class: VehicleClass, is_50cc: bool) -> String {
        let capped: String = corrected.chars().take(self.max_len).collect();
        let layout = match class {
            VehicleClass::Car => PlateLayout::Car,
            VehicleClass::Motorcycle if is_50cc => PlateLayout::Motorcycle50cc,
            VehicleClass::Motorcycle => PlateLayout::Motorcycle,
            VehicleClass::Unknown => return capped,
        };

        let len = capped.chars().count();
        self.formats
            .iter()
            .find(|rule| rule.layout == layout && rule.len == len)
            .and_then(|rule| rule.apply(&capped))
            .unwrap_or(capped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_format_table() {
        let g = PlateGrammar::default();
        assert_eq!(g.format("30A12345", VehicleClass::Car, false), "30A-123.45");
        assert_eq!(g.format("30A1234", VehicleClass::Car, false), "30A-1234");
        assert_eq!(g.format("30A123456", VehicleClass::Car, false), "30A-123.45");
        assert_eq!(g.format("29A112345", VehicleClass::Motorcycle, false), "29-A1 123.45");
        assert_eq!(g.format("29A11234", VehicleClass::Motorcycle, false), "29-A1 1234");
        assert_eq!(g.format("29A1123", VehicleClass::Motorcycle, false), "29-A1 123");
        assert_eq!(g.format("29AA1234", VehicleClass::Motorcycle, true), "29-AA 1234");
        assert_eq!(g.format("29AA12345", VehicleClass::Motorcycle, true), "29-AA 123.45");
    }

    #[test]
    fn test_format_degrades_to_raw() {
        let g = PlateGrammar::default();
        assert_eq!(g.format("29AA123", VehicleClass::Motorcycle, true), "29AA123");
        assert_eq!(g.format("30A12", VehicleClass::Car, false), "30A12");
        assert_eq!(g.format("30A1234567", VehicleClass::Unknown, false), "30A123456");
    }

    #[test]
    fn test_classify() {
        let g = PlateGrammar::default();
        assert_eq!(g.classify(&lines(&["30A12345"])), (VehicleClass::Car, false));
        assert_eq!(g.classify(&lines(&["37A", "555.55"])), (VehicleClass::Car, false));
        assert_eq!(g.classify(&lines(&["29-A1", "123.45"])), (VehicleClass::Motorcycle, false));
        assert_eq!(g.classify(&lines(&["29AA", "12345"])), (VehicleClass::Motorcycle, true));
        assert_eq!(g.classify(&lines(&["29A1X", "1234"])), (VehicleClass::Motorcycle, false));
        assert_eq!(g.classify(&lines(&["29AXY", "1234"])), (VehicleClass::Motorcycle, true));
        assert_eq!(g.classify(&lines(&["2.", "1234"])), (VehicleClass::Unknown, false));
        assert_eq!(g.classify(&[]), (VehicleClass::Unknown, false));
    }

    #[test]
    fn test_correct_by_position() {
        let g = PlateGrammar::default();
        // Province digits, series letter, then digits.
        assert_eq!(g.correct("3O8I2S45", false), "30B12545");
        assert_eq!(g.correct("2981234B", false), "29B12348");
        // 50cc keeps the second series letter.
        assert_eq!(g.correct("2944I234", true), "29AA1234");
    }

    #[test]
    fn test_short_strings_are_not_corrected() {
        let g = PlateGrammar::default();
        assert_eq!(g.correct("3OA12", false), "3OA12");
    }

    #[test]
    fn test_province_codes() {
        let g = PlateGrammar::default();
        assert!(g.province_valid("29A12345"));
        assert!(!g.province_valid("13A12345"));
        assert!(!g.province_valid("05A12345"));
        assert!(!g.province_valid("XYA12345"));
        assert!(!g.province_valid("3"));
    }

    #[test]
    fn test_clean() {
        assert_eq!(clean("29-a1 123.45"), "29A112345");
    }

    #[test]
    fn test_grammar_from_json_overrides_exclusions() {
        let g: PlateGrammar = serde_json::from_str(r#"{"excluded_provinces": []}"#).unwrap();
        assert!(g.is_valid_province(13));
        assert_eq!(g.format("30A12345", VehicleClass::Car, false), "30A-123.45");
    }
}
