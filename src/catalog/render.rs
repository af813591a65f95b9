//! Pure rendering of event lists: day grouping, schedule text, statistics.

use chrono::{FixedOffset, NaiveDate};

use crate::store::Event;

/// Group events into calendar-day buckets in the venue offset.
///
/// Buckets are in ascending date order and events inside a bucket are in
/// ascending start order. Input order does not matter; ties keep it.
pub fn group_by_day(events: &[Event], offset: FixedOffset) -> Vec<(NaiveDate, Vec<&Event>)> {
    let mut sorted: Vec<&Event> = events.iter().collect();
    sorted.sort_by_key(|e| e.starts_at);

    let mut days: Vec<(NaiveDate, Vec<&Event>)> = Vec::new();
    for event in sorted {
        let day = event.starts_at.with_timezone(&offset).date_naive();
        match days.last_mut() {
            Some((last, bucket)) if *last == day => bucket.push(event),
            _ => days.push((day, vec![event])),
        }
    }
    days
}

/// Render a schedule as HTML: a bold day header, then one entry per event.
///
/// Each entry is `HH:MM - name`, followed by the description on its own
/// line when present, and a blank line.
pub fn render_schedule(events: &[Event], offset: FixedOffset) -> String {
    let mut out = String::new();
    for (day, bucket) in group_by_day(events, offset) {
        out.push_str(&format!("<b>{}</b>\n", day.format("%-d %B %Y")));
        for event in bucket {
            let local = event.starts_at.with_timezone(&offset);
            out.push_str(&format!(
                "{} - {}",
                local.format("%H:%M"),
                escape_html(&event.name)
            ));
            if !event.description.is_empty() {
                out.push('\n');
                out.push_str(&escape_html(&event.description));
            }
            out.push_str("\n\n");
        }
    }
    out
}

/// Render per-event registration counts as `index) name: count`, one-indexed.
pub fn render_statistics(counts: &[(Event, i64)]) -> String {
    counts
        .iter()
        .enumerate()
        .map(|(i, (event, count))| format!("{}) {}: {}\n\n", i + 1, event.name, count))
        .collect()
}

/// Escape text for HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn event(id: i64, name: &str, y: i32, m: u32, d: u32, h: u32, desc: &str) -> Event {
        Event {
            id,
            name: name.into(),
            starts_at: Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap(),
            description: desc.into(),
        }
    }

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn groups_into_days() {
        let events = vec![
            event(1, "Opening", 2024, 5, 21, 18, ""),
            event(2, "Concert", 2024, 5, 21, 20, ""),
            event(3, "Breakfast", 2024, 5, 22, 9, ""),
        ];
        let days = group_by_day(&events, utc());
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].0, NaiveDate::from_ymd_opt(2024, 5, 21).unwrap());
        assert_eq!(days[0].1.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(days[1].1.iter().map(|e| e.id).collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn grouping_sorts_unordered_input() {
        let events = vec![
            event(3, "Breakfast", 2024, 5, 22, 9, ""),
            event(2, "Concert", 2024, 5, 21, 20, ""),
            event(1, "Opening", 2024, 5, 21, 18, ""),
        ];
        let days = group_by_day(&events, utc());
        assert_eq!(days[0].1.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn offset_moves_day_boundary() {
        let events = vec![event(1, "Late", 2024, 5, 21, 22, "")];
        let days = group_by_day(&events, FixedOffset::east_opt(3 * 3600).unwrap());
        assert_eq!(days[0].0, NaiveDate::from_ymd_opt(2024, 5, 22).unwrap());
    }

    #[test]
    fn schedule_layout() {
        let events = vec![
            event(1, "Opening", 2024, 5, 21, 18, "Main hall"),
            event(2, "Concert", 2024, 5, 21, 20, ""),
            event(3, "Breakfast", 2024, 5, 22, 9, ""),
        ];
        let text = render_schedule(&events, utc());
        assert_eq!(
            text,
            "<b>21 May 2024</b>\n18:00 - Opening\nMain hall\n\n20:00 - Concert\n\n\
             <b>22 May 2024</b>\n09:00 - Breakfast\n\n"
        );
        assert_eq!(text.matches("<b>").count(), 2);
    }

    #[test]
    fn schedule_escapes_markup() {
        let events = vec![event(1, "Q&A <live>", 2024, 5, 21, 18, "a < b")];
        let text = render_schedule(&events, utc());
        assert!(text.contains("Q&amp;A &lt;live&gt;"));
        assert!(text.contains("a &lt; b"));
    }

    #[test]
    fn empty_schedule_is_empty() {
        assert!(render_schedule(&[], utc()).is_empty());
    }

    #[test]
    fn statistics_layout() {
        let counts = vec![
            (event(1, "A", 2024, 5, 21, 18, ""), 3),
            (event(2, "B", 2024, 5, 21, 20, ""), 0),
        ];
        assert_eq!(render_statistics(&counts), "1) A: 3\n\n2) B: 0\n\n");
    }
}
