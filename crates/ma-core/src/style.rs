//! Terminal styling helpers with NO_COLOR support.

/// Check if color output is enabled (respects `NO_COLOR` env var).
pub fn color_enabled() -> bool {
    std::env::var_os("NO_COLOR").is_none()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Red,
    Green,
    Yellow,
    Cyan,
    Gray,
}

impl Color {
    fn code(self) -> &'static str {
        match self {
            Color::Red => "\x1b[31m",
            Color::Green => "\x1b[32m",
            Color::Yellow => "\x1b[33m",
            Color::Cyan => "\x1b[36m",
            Color::Gray => "\x1b[90m",
        }
    }
}

/// Terminal style helper that respects NO_COLOR.
#[derive(Debug, Clone, Copy)]
pub struct Style {
    enabled: bool,
}

impl Default for Style {
    fn default() -> Self {
        Self::new()
    }
}

impl Style {
    pub fn new() -> Self {
        Self {
            enabled: color_enabled(),
        }
    }

    /// Create a style with colors explicitly enabled (for tests).
    pub fn force_enabled() -> Self {
        Self { enabled: true }
    }

    /// Create a style with colors explicitly disabled.
    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Wrap `text` in a color, or return it unchanged when colors are off.
    pub fn paint(&self, color: Color, text: &str) -> String {
        if self.enabled {
            format!("{}{text}{}", color.code(), self.reset())
        } else {
            text.to_string()
        }
    }

    pub fn bold(&self, text: &str) -> String {
        if self.enabled {
            format!("\x1b[1m{text}{}", self.reset())
        } else {
            text.to_string()
        }
    }

    pub fn reset(&self) -> &'static str {
        if self.enabled {
            "\x1b[0m"
        } else {
            ""
        }
    }
}

/// Compute visible width of a string, ignoring ANSI escape sequences.
pub fn visible_width(s: &str) -> usize {
    let mut width = 0;
    let mut in_escape = false;
    for c in s.chars() {
        if in_escape {
            if c.is_ascii_alphabetic() {
                in_escape = false;
            }
        } else if c == '\x1b' {
            in_escape = true;
        } else {
            width += char_width(c);
        }
    }
    width
}

/// Approximate display width of a character.
fn char_width(c: char) -> usize {
    if c < ' ' {
        return 0;
    }
    if c.is_ascii() {
        return 1;
    }
    let cp = c as u32;
    // Hangul Jamo, CJK, fullwidth forms
    if (0x1100..=0x115F).contains(&cp)
        || (0x2E80..=0x303E).contains(&cp)
        || (0x3040..=0x33BF).contains(&cp)
        || (0x3400..=0x4DBF).contains(&cp)
        || (0x4E00..=0x9FFF).contains(&cp)
        || (0xF900..=0xFAFF).contains(&cp)
        || (0xFE30..=0xFE6F).contains(&cp)
        || (0xFF01..=0xFF60).contains(&cp)
        || (0x20000..=0x2FFFF).contains(&cp)
    {
        2
    } else {
        1
    }
}

/// Format a token count for display: `340` for small, `1.2k` for 1000+.
pub fn format_tokens(n: u32) -> String {
    if n >= 1000 {
        let k = n as f64 / 1000.0;
        format!("{k:.1}k")
    } else {
        n.to_string()
    }
}
