use ratatui::layout::{Constraint, Flex, Layout, Rect};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// `m:ss`, minutes unbounded (`90:00` for an hour and a half).
pub fn format_time(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

pub fn format_minutes(seconds: u64) -> String {
    match seconds.div_ceil(60) {
        1 => "1 minute".to_string(),
        m => format!("{m} minutes"),
    }
}

/// `A`, `B`, ... for option positions; falls back to the 1-based number past `Z`.
pub fn option_label(index: usize) -> String {
    match u8::try_from(index) {
        Ok(i) if i < 26 => char::from(b'A' + i).to_string(),
        _ => (index + 1).to_string(),
    }
}

pub fn pluralize(count: usize, word: &str) -> String {
    if count == 1 {
        format!("{count} {word}")
    } else {
        format!("{count} {word}s")
    }
}

/// Cuts `text` to at most `width` display columns, marking the cut with `…`.
pub fn truncate(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    if width == 0 {
        return String::new();
    }
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w + 1 > width {
            break;
        }
        used += w;
        out.push(c);
    }
    out.push('…');
    out
}

/// Centered rectangle of at most `width` x `height` inside `area`.
pub fn popup_area(area: Rect, width: u16, height: u16) -> Rect {
    let [row] = Layout::vertical([Constraint::Length(height.min(area.height))])
        .flex(Flex::Center)
        .areas(area);
    let [cell] = Layout::horizontal([Constraint::Length(width.min(area.width))])
        .flex(Flex::Center)
        .areas(row);
    cell
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0), "0:00");
        assert_eq!(format_time(9), "0:09");
        assert_eq!(format_time(61), "1:01");
        assert_eq!(format_time(3600), "60:00");
        assert_eq!(format_time(5400), "90:00");
    }

    #[test]
    fn test_format_minutes() {
        assert_eq!(format_minutes(60), "1 minute");
        assert_eq!(format_minutes(2700), "45 minutes");
        assert_eq!(format_minutes(61), "2 minutes");
    }

    #[test]
    fn test_option_label() {
        assert_eq!(option_label(0), "A");
        assert_eq!(option_label(3), "D");
        assert_eq!(option_label(25), "Z");
        assert_eq!(option_label(26), "27");
    }

    #[test]
    fn test_pluralize() {
        assert_eq!(pluralize(1, "question"), "1 question");
        assert_eq!(pluralize(0, "question"), "0 questions");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("exactly", 7), "exactly");
        assert_eq!(truncate("a longer sentence", 8), "a longe…");
        assert_eq!(truncate("anything", 0), "");
        assert!(truncate("画像を表示する", 6).width() <= 6);
    }

    #[test]
    fn test_popup_area_is_centered_and_clamped() {
        let area = Rect::new(0, 0, 80, 24);
        assert_eq!(popup_area(area, 40, 6), Rect::new(20, 9, 40, 6));
        assert_eq!(popup_area(Rect::new(0, 0, 10, 3), 40, 6), Rect::new(0, 0, 10, 3));
    }
}
