//! Cell formatting records and the sheet-local style registry.

use super::StyleId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// A colour reference as SpreadsheetML stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    /// ARGB hex value (`FFRRGGBB`)
    Rgb(String),
    /// Theme colour with optional tint
    Theme {
        /// Theme slot
        theme: u32,
        /// Tint in -1.0..=1.0
        #[serde(skip_serializing_if = "Option::is_none")]
        tint: Option<f64>,
    },
    /// Legacy palette index
    Indexed(u32),
    /// Automatic colour
    Auto,
}

impl Color {
    /// Create an RGB colour from `RRGGBB`, `#RRGGBB` or `AARRGGBB`.
    pub fn rgb(hex: &str) -> Self {
        Color::Rgb(hex.to_string()).canonical()
    }

    pub(crate) fn canonical(&self) -> Self {
        match self {
            Color::Rgb(hex) => {
                let hex = hex.trim_start_matches('#').to_ascii_uppercase();
                if hex.len() == 6 {
                    Color::Rgb(format!("FF{hex}"))
                } else {
                    Color::Rgb(hex)
                }
            }
            Color::Theme { theme, tint } => Color::Theme {
                theme: *theme,
                tint: tint.filter(|t| *t != 0.0),
            },
            other => other.clone(),
        }
    }
}

/// Font record (`<font>` in `styles.xml`, `<rPr>` in rich text).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Font {
    /// Font face name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Size in points
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
    /// Bold
    #[serde(default)]
    pub bold: bool,
    /// Italic
    #[serde(default)]
    pub italic: bool,
    /// Underline style (`single`, `double`, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub underline: Option<String>,
    /// Strike-through
    #[serde(default)]
    pub strike: bool,
    /// Font colour
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
    /// Font family number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<u32>,
    /// Theme font scheme (`minor`, `major`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
}

impl Font {
    pub(crate) fn canonical(&self) -> Self {
        Self {
            color: self.color.as_ref().map(Color::canonical),
            underline: self.underline.clone().filter(|u| u != "none"),
            ..self.clone()
        }
    }
}

/// Pattern fill record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    /// Pattern type (`none`, `solid`, `gray125`, ...)
    pub pattern: String,
    /// Foreground colour
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fg: Option<Color>,
    /// Background colour
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bg: Option<Color>,
}

impl Default for Fill {
    fn default() -> Self {
        Self {
            pattern: "none".to_string(),
            fg: None,
            bg: None,
        }
    }
}

impl Fill {
    /// Solid fill of one colour.
    pub fn solid(color: Color) -> Self {
        Self {
            pattern: "solid".to_string(),
            fg: Some(color),
            bg: None,
        }
    }

    pub(crate) fn canonical(&self) -> Self {
        Self {
            pattern: self.pattern.clone(),
            fg: self.fg.as_ref().map(Color::canonical),
            bg: self.bg.as_ref().map(Color::canonical),
        }
    }
}

/// One edge of a border.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BorderSide {
    /// Line style (`thin`, `medium`, ...); `None` means no line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    /// Line colour
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
}

impl BorderSide {
    pub(crate) fn canonical(&self) -> Self {
        match self.style.as_deref() {
            None | Some("none") => Self::default(),
            Some(_) => Self {
                style: self.style.clone(),
                color: self.color.as_ref().map(Color::canonical),
            },
        }
    }
}

/// Border record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Border {
    /// Left edge
    #[serde(default)]
    pub left: BorderSide,
    /// Right edge
    #[serde(default)]
    pub right: BorderSide,
    /// Top edge
    #[serde(default)]
    pub top: BorderSide,
    /// Bottom edge
    #[serde(default)]
    pub bottom: BorderSide,
    /// Diagonal
    #[serde(default)]
    pub diagonal: BorderSide,
}

impl Border {
    pub(crate) fn canonical(&self) -> Self {
        Self {
            left: self.left.canonical(),
            right: self.right.canonical(),
            top: self.top.canonical(),
            bottom: self.bottom.canonical(),
            diagonal: self.diagonal.canonical(),
        }
    }
}

/// Number format: a built-in id or a custom format code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumFmt {
    /// Built-in format id (0-49)
    Builtin(u32),
    /// Custom format code
    Custom(String),
}

impl Default for NumFmt {
    fn default() -> Self {
        NumFmt::Builtin(0)
    }
}

/// Codes of the built-in number formats that have a fixed definition.
pub(crate) const BUILTIN_NUM_FMTS: &[(u32, &str)] = &[
    (0, "General"),
    (1, "0"),
    (2, "0.00"),
    (3, "#,##0"),
    (4, "#,##0.00"),
    (9, "0%"),
    (10, "0.00%"),
    (11, "0.00E+00"),
    (12, "# ?/?"),
    (13, "# ??/??"),
    (14, "m/d/yyyy"),
    (15, "d-mmm-yy"),
    (16, "d-mmm"),
    (17, "mmm-yy"),
    (18, "h:mm AM/PM"),
    (19, "h:mm:ss AM/PM"),
    (20, "h:mm"),
    (21, "h:mm:ss"),
    (22, "m/d/yy h:mm"),
    (37, "#,##0 ;(#,##0)"),
    (38, "#,##0 ;[Red](#,##0)"),
    (39, "#,##0.00;(#,##0.00)"),
    (40, "#,##0.00;[Red](#,##0.00)"),
    (45, "mm:ss"),
    (46, "[h]:mm:ss"),
    (47, "mmss.0"),
    (48, "##0.0E+0"),
    (49, "@"),
];

impl NumFmt {
    /// Format code, if known.
    pub fn code(&self) -> Option<&str> {
        match self {
            NumFmt::Builtin(id) => BUILTIN_NUM_FMTS
                .iter()
                .find(|(i, _)| i == id)
                .map(|(_, c)| *c),
            NumFmt::Custom(code) => Some(code),
        }
    }

    /// Whether values in this format are dates or times.
    pub fn is_date(&self) -> bool {
        match self {
            NumFmt::Builtin(id) => is_builtin_date_format(*id),
            NumFmt::Custom(code) => is_date_format_code(code),
        }
    }

    pub(crate) fn canonical(&self) -> Self {
        match self {
            NumFmt::Custom(code) => BUILTIN_NUM_FMTS
                .iter()
                .find(|(_, c)| c == code)
                .map(|(id, _)| NumFmt::Builtin(*id))
                .unwrap_or_else(|| self.clone()),
            NumFmt::Builtin(_) => self.clone(),
        }
    }
}

/// Built-in ids 14-22 are dates, 45-47 times.
pub(crate) fn is_builtin_date_format(id: u32) -> bool {
    (14..=22).contains(&id) || (45..=47).contains(&id)
}

/// Check if a format code string represents a date format.
///
/// Characters in square brackets (`[Red]`, `[$-409]`) and quoted literals are ignored.
pub(crate) fn is_date_format_code(format_code: &str) -> bool {
    let mut in_bracket = false;
    let mut in_quote = false;
    let mut escaped = false;

    for c in format_code.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if !in_quote => escaped = true,
            '[' if !in_quote => in_bracket = true,
            ']' if !in_quote => in_bracket = false,
            '"' => in_quote = !in_quote,
            _ if !in_bracket && !in_quote => match c.to_ascii_lowercase() {
                'd' | 'y' | 'h' | 's' => return true,
                'm' => return true,
                _ => {}
            },
            _ => {}
        }
    }

    false
}

/// Cell alignment record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Alignment {
    /// Horizontal alignment (`left`, `center`, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub horizontal: Option<String>,
    /// Vertical alignment (`top`, `center`, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vertical: Option<String>,
    /// Wrap text
    #[serde(default)]
    pub wrap_text: bool,
    /// Indent level
    #[serde(default)]
    pub indent: u32,
    /// Text rotation in degrees (0-180, 255 = vertical)
    #[serde(default)]
    pub text_rotation: u32,
    /// Shrink to fit
    #[serde(default)]
    pub shrink_to_fit: bool,
}

impl Alignment {
    /// Whether no alignment property is set.
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    pub(crate) fn canonical(&self) -> Self {
        Self {
            horizontal: self.horizontal.clone().filter(|h| h != "general"),
            vertical: self.vertical.clone().filter(|v| v != "bottom"),
            ..self.clone()
        }
    }
}

/// A complete cell format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellStyle {
    /// Font
    #[serde(default)]
    pub font: Font,
    /// Fill
    #[serde(default)]
    pub fill: Fill,
    /// Border
    #[serde(default)]
    pub border: Border,
    /// Number format
    #[serde(default)]
    pub num_fmt: NumFmt,
    /// Alignment
    #[serde(default)]
    pub alignment: Alignment,
}

/// Structural hash of a [`CellStyle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalKey([u8; 32]);

impl CellStyle {
    /// Style with a number format and everything else default.
    pub fn with_num_fmt(num_fmt: NumFmt) -> Self {
        Self {
            num_fmt,
            ..Default::default()
        }
    }

    /// Normalised copy: colours as uppercase ARGB, custom codes that match a built-in
    /// format replaced by the built-in id, default-equivalent attributes cleared.
    pub fn canonical(&self) -> Self {
        Self {
            font: self.font.canonical(),
            fill: self.fill.canonical(),
            border: self.border.canonical(),
            num_fmt: self.num_fmt.canonical(),
            alignment: self.alignment.canonical(),
        }
    }

    /// Deterministic structural key. Equal formats always produce equal keys.
    pub fn canonical_key(&self) -> CanonicalKey {
        let canonical = self.canonical();
        let mut hasher = Sha256::new();
        // Field order is fixed by the struct definitions.
        match serde_json::to_vec(&canonical) {
            Ok(bytes) => hasher.update(&bytes),
            Err(_) => hasher.update(format!("{canonical:?}").as_bytes()),
        }
        CanonicalKey(hasher.finalize().into())
    }
}

/// Sheet-local style table: each distinct format gets one [`StyleId`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StyleRegistry {
    styles: Vec<CellStyle>,
    #[serde(skip)]
    by_key: HashMap<CanonicalKey, StyleId>,
}

impl PartialEq for StyleRegistry {
    fn eq(&self, other: &Self) -> bool {
        self.styles == other.styles
    }
}

impl StyleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the id of an equal format, registering it if new.
    pub fn intern(&mut self, style: CellStyle) -> StyleId {
        if self.by_key.len() != self.styles.len() {
            self.rebuild_keys();
        }
        let key = style.canonical_key();
        if let Some(id) = self.by_key.get(&key) {
            return *id;
        }
        let id = StyleId(self.styles.len() as u32);
        self.styles.push(style);
        self.by_key.insert(key, id);
        id
    }

    /// Look up a format.
    pub fn get(&self, id: StyleId) -> Option<&CellStyle> {
        self.styles.get(id.0 as usize)
    }

    /// Number of registered formats.
    pub fn len(&self) -> usize {
        self.styles.len()
    }

    /// Whether no format is registered.
    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }

    /// Formats in id order.
    pub fn iter(&self) -> impl Iterator<Item = (StyleId, &CellStyle)> {
        self.styles
            .iter()
            .enumerate()
            .map(|(i, s)| (StyleId(i as u32), s))
    }

    // Keys are skipped by serde; recompute after deserialisation.
    fn rebuild_keys(&mut self) {
        self.by_key.clear();
        for (i, style) in self.styles.iter().enumerate() {
            self.by_key
                .entry(style.canonical_key())
                .or_insert(StyleId(i as u32));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_canonical() {
        assert_eq!(Color::rgb("#ff0000"), Color::Rgb("FFFF0000".into()));
        assert_eq!(Color::rgb("80ff0000"), Color::Rgb("80FF0000".into()));
    }

    #[test]
    fn test_canonical_key_ignores_spelling() {
        let a = CellStyle {
            font: Font {
                bold: true,
                color: Some(Color::Rgb("ff0000".into())),
                ..Default::default()
            },
            num_fmt: NumFmt::Custom("0.00".into()),
            ..Default::default()
        };
        let b = CellStyle {
            font: Font {
                bold: true,
                color: Some(Color::Rgb("#FF0000".into())),
                ..Default::default()
            },
            num_fmt: NumFmt::Builtin(2),
            ..Default::default()
        };
        assert_eq!(a.canonical_key(), b.canonical_key());

        let c = CellStyle {
            font: Font {
                italic: true,
                ..Default::default()
            },
            ..Default::default()
        };
        assert_ne!(a.canonical_key(), c.canonical_key());
    }

    #[test]
    fn test_border_none_is_default() {
        let a = CellStyle {
            border: Border {
                left: BorderSide {
                    style: Some("none".into()),
                    color: Some(Color::Auto),
                },
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(a.canonical_key(), CellStyle::default().canonical_key());
    }

    #[test]
    fn test_registry_dedup() {
        let mut reg = StyleRegistry::new();
        let bold = CellStyle {
            font: Font {
                bold: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let a = reg.intern(bold.clone());
        let b = reg.intern(CellStyle::default());
        let c = reg.intern(bold);
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn test_date_format_detection() {
        assert!(NumFmt::Builtin(14).is_date());
        assert!(NumFmt::Builtin(22).is_date());
        assert!(!NumFmt::Builtin(0).is_date());
        assert!(!NumFmt::Builtin(2).is_date());
        assert!(NumFmt::Custom("yyyy-mm-dd".into()).is_date());
        assert!(NumFmt::Custom("[$-409]mmmm\\ d\\,\\ yyyy;@".into()).is_date());
        assert!(!NumFmt::Custom("0.00".into()).is_date());
        assert!(!NumFmt::Custom("#,##0".into()).is_date());
        assert!(!NumFmt::Custom("\"$\"#,##0.00".into()).is_date());
        assert!(!NumFmt::Custom("[Red]0.00".into()).is_date());
    }
}
