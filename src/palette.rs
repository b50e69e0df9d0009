use serde::{Deserialize, Serialize};

/// Built-in character sets, ordered dense/dark to sparse/light.
///
/// `simple` and `blocks` use Unicode block elements; `detailed` is plain
/// ASCII. Every set ends in space so fully lit pixels render as background.
const BUILTIN_PALETTES: &[(&str, &str)] = &[
    ("detailed", "@%#*+=-:. "),
    ("simple", "█▓▒░ "),
    ("blocks", "████▓▓▓▒▒▒░░░   "),
];

/// An ordered, non-empty character sequence used to represent luminance
/// buckets when rasterizing a frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Palette {
    name: String,
    chars: Vec<char>,
}

impl Palette {
    /// Look up one of the built-in palettes by name.
    pub fn by_name(name: &str) -> Option<Self> {
        BUILTIN_PALETTES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(n, chars)| Self {
                name: (*n).to_string(),
                chars: chars.chars().collect(),
            })
    }

    /// Build a palette from an arbitrary character sequence.
    /// Returns `None` for an empty sequence.
    pub fn from_chars(name: &str, chars: &str) -> Option<Self> {
        if chars.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            chars: chars.chars().collect(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// Map a post-contrast luminance value to a palette character.
    ///
    /// The index is `floor((v / 255) * (len - 1))`: monotonic in `luma`
    /// and always within `[0, len - 1]`.
    pub fn char_for(&self, luma: u8) -> char {
        let last = self.chars.len() - 1;
        let idx = (luma as usize * last) / 255;
        self.chars[idx]
    }

    /// Names of all built-in palettes.
    pub fn builtin_names() -> Vec<&'static str> {
        BUILTIN_PALETTES.iter().map(|(n, _)| *n).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_lookup() {
        for name in Palette::builtin_names() {
            let p = Palette::by_name(name).unwrap();
            assert!(!p.is_empty());
            assert_eq!(p.name(), name);
        }
        assert!(Palette::by_name("nope").is_none());
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert!(Palette::by_name("Detailed").is_some());
    }

    #[test]
    fn empty_charset_rejected() {
        assert!(Palette::from_chars("custom", "").is_none());
    }

    #[test]
    fn index_mapping_is_monotonic_and_in_bounds() {
        let p = Palette::by_name("detailed").unwrap();
        let mut prev = p.char_for(0);
        let order: Vec<char> = "@%#*+=-:. ".chars().collect();
        let pos = |c: char| order.iter().position(|&x| x == c).unwrap();
        for v in 0..=255u8 {
            let c = p.char_for(v);
            assert!(pos(c) >= pos(prev), "index decreased at luma {}", v);
            prev = c;
        }
        assert_eq!(p.char_for(0), '@');
        assert_eq!(p.char_for(255), ' ');
    }

    #[test]
    fn two_char_palette_splits_at_midpoint() {
        let p = Palette::from_chars("bw", "@ ").unwrap();
        assert_eq!(p.char_for(0), '@');
        assert_eq!(p.char_for(254), '@');
        assert_eq!(p.char_for(255), ' ');
    }
}
