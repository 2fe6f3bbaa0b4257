use std::fmt::Write as _;

use client_core::{Entry, SessionsView};
use shared::domain::SessionHash;

fn render_entry(out: &mut String, entry: &Entry) {
    let _ = writeln!(
        out,
        "  [{}] {} ({})",
        entry.hash,
        entry.name,
        entry.device_type().as_str()
    );
    let details: Vec<&str> = [entry.info.as_str(), entry.system.as_str()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect();
    if !details.is_empty() {
        let _ = writeln!(out, "      {}", details.join(", "));
    }
    let place: Vec<&str> = [entry.ip.as_str(), entry.location.as_str()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect();
    let mut last_line = place.join(" ");
    if !entry.active.is_empty() {
        if !last_line.is_empty() {
            last_line.push_str(", ");
        }
        last_line.push_str("active ");
        last_line.push_str(&entry.active);
    }
    if entry.calls_disabled {
        if !last_line.is_empty() {
            last_line.push_str(", ");
        }
        last_line.push_str("calls off");
    }
    if !last_line.is_empty() {
        let _ = writeln!(out, "      {last_line}");
    }
}

pub fn render_termination(hash: Option<SessionHash>, confirmed: bool) -> String {
    match (hash, confirmed) {
        (Some(hash), true) => format!("terminated {hash}\n"),
        (Some(hash), false) => format!("server kept session {hash}\n"),
        (None, true) => "terminated all other sessions\n".to_string(),
        (None, false) => "server kept the other sessions\n".to_string(),
    }
}

pub fn render_view(view: Option<&SessionsView>) -> String {
    let Some(view) = view else {
        return "no sessions loaded\n".to_string();
    };
    let mut out = String::new();
    if let Some(current) = &view.current {
        out.push_str("This device\n");
        render_entry(&mut out, current);
    }
    if !view.incomplete.is_empty() {
        out.push_str("Incomplete sign-ins\n");
        for entry in &view.incomplete {
            render_entry(&mut out, entry);
        }
    }
    let _ = writeln!(out, "Other sessions ({})", view.others_count());
    for entry in &view.list {
        render_entry(&mut out, entry);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::domain::ApiId;

    fn entry(hash: u64, name: &str) -> Entry {
        Entry {
            hash: SessionHash(hash),
            api_id: ApiId(6),
            name: name.into(),
            info: "Telegram Android 10.12".into(),
            ip: "203.0.113.7".into(),
            location: "Bavaria, Germany".into(),
            active: "12:30".into(),
            ..Entry::default()
        }
    }

    #[test]
    fn nothing_loaded_is_reported() {
        assert_eq!(render_view(None), "no sessions loaded\n");
    }

    #[test]
    fn declined_termination_is_not_reported_as_done() {
        assert_eq!(
            render_termination(None, false),
            "server kept the other sessions\n"
        );
        assert_eq!(
            render_termination(None, true),
            "terminated all other sessions\n"
        );
        assert_eq!(
            render_termination(Some(SessionHash(0x2a)), false),
            "server kept session 000000000000002a\n"
        );
    }

    #[test]
    fn groups_are_rendered_in_order() {
        let view = SessionsView {
            current: Some(entry(0, "Pixel 8")),
            incomplete: vec![entry(2, "Unknown")],
            list: vec![Entry {
                calls_disabled: true,
                ..entry(1, "Galaxy S23")
            }],
        };
        let text = render_view(Some(&view));

        let this = text.find("This device").expect("current");
        let incomplete = text.find("Incomplete sign-ins").expect("incomplete");
        let others = text.find("Other sessions (1)").expect("others");
        assert!(this < incomplete && incomplete < others);
        assert!(text.contains("[0000000000000001] Galaxy S23 (android)"));
        assert!(text.contains("203.0.113.7 Bavaria, Germany, active 12:30, calls off"));
    }

    #[test]
    fn empty_fields_are_skipped() {
        let view = SessionsView {
            current: None,
            incomplete: Vec::new(),
            list: vec![Entry {
                hash: SessionHash(3),
                name: "Bare".into(),
                ..Entry::default()
            }],
        };
        assert_eq!(
            render_view(Some(&view)),
            "Other sessions (1)\n  [0000000000000003] Bare (other)\n"
        );
    }
}
