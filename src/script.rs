//! Right-to-left text handling shared by the stamping engine and the
//! signature renderer.
//!
//! Neither `rusttype` nor a single `rustybuzz` shaping call performs the
//! Unicode bidi algorithm, so text containing Hebrew (or any other RTL
//! script) is converted to *visual* order first and then drawn left to right.
//! The reordering is deliberately simple: the paragraph is treated as RTL,
//! runs are reversed, and characters are reversed only inside RTL runs, so
//! numbers and Latin words keep their reading order.

/// True for code points in the Hebrew/Arabic blocks and their presentation forms.
pub fn is_rtl_char(ch: char) -> bool {
    matches!(
        ch as u32,
        0x0590..=0x08FF | 0xFB1D..=0xFDFF | 0xFE70..=0xFEFF | 0x1EE00..=0x1EEFF
    )
}

/// True if any character of `text` belongs to an RTL script.
pub fn contains_rtl(text: &str) -> bool {
    text.chars().any(is_rtl_char)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunClass {
    Rtl,
    Ltr,
    Space,
}

fn classify(ch: char) -> RunClass {
    if is_rtl_char(ch) {
        RunClass::Rtl
    } else if ch.is_whitespace() {
        RunClass::Space
    } else {
        RunClass::Ltr
    }
}

/// Convert logical-order text to left-to-right visual order.
///
/// Text without RTL characters is returned unchanged.
pub fn visual_order(text: &str) -> String {
    if !contains_rtl(text) {
        return text.to_string();
    }

    let mut runs: Vec<(RunClass, String)> = Vec::new();
    for ch in text.chars() {
        let class = classify(ch);
        match runs.last_mut() {
            Some((c, run)) if *c == class => run.push(ch),
            _ => runs.push((class, ch.to_string())),
        }
    }

    runs.iter()
        .rev()
        .map(|(class, run)| match class {
            RunClass::Rtl => run.chars().rev().collect::<String>(),
            RunClass::Ltr | RunClass::Space => run.clone(),
        })
        .collect()
}
