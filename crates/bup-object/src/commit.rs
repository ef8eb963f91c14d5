//! Commit payload encoding.

use chrono::{Local, Offset};

use bup_hash::ObjectId;

/// Format a timestamp the way commit headers expect: `"<secs> ±HHMM"`.
pub fn format_date(secs: i64, tz_offset_secs: i32) -> String {
    let sign = if tz_offset_secs < 0 { '-' } else { '+' };
    let abs = tz_offset_secs.unsigned_abs();
    format!("{secs} {sign}{:02}{:02}", abs / 3600, (abs % 3600) / 60)
}

/// The local UTC offset, in seconds.
pub fn local_tz_offset() -> i32 {
    Local::now().offset().fix().local_minus_utc()
}

/// Build a commit payload.
///
/// Lines: `tree`, optional `parent`, `author`, `committer`, a blank line,
/// then the message. All fields but the message are optional so partial
/// commits can be constructed in tests.
pub fn encode_commit(
    tree: Option<&ObjectId>,
    parent: Option<&ObjectId>,
    author: Option<(&str, i64, i32)>,
    committer: Option<(&str, i64, i32)>,
    msg: &str,
) -> Vec<u8> {
    let mut lines: Vec<String> = Vec::new();
    if let Some(tree) = tree {
        lines.push(format!("tree {}", tree.to_hex()));
    }
    if let Some(parent) = parent {
        lines.push(format!("parent {}", parent.to_hex()));
    }
    if let Some((who, secs, tz)) = author {
        lines.push(format!("author {who} {}", format_date(secs, tz)));
    }
    if let Some((who, secs, tz)) = committer {
        lines.push(format!("committer {who} {}", format_date(secs, tz)));
    }
    lines.push(String::new());
    lines.push(msg.to_string());
    lines.join("\n").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_formatting() {
        assert_eq!(format_date(0, 0), "0 +0000");
        assert_eq!(format_date(1234567890, -8 * 3600), "1234567890 -0800");
        assert_eq!(format_date(100, 5 * 3600 + 30 * 60), "100 +0530");
    }

    #[test]
    fn commit_layout() {
        let tree =
            ObjectId::from_hex("496d6428b9cf92981dc9495211e6e1120fb6f2ba").unwrap();
        let parent =
            ObjectId::from_hex("e69de29bb2d1d6434b8b29ae775ad8c2e48c5391").unwrap();
        let buf = encode_commit(
            Some(&tree),
            Some(&parent),
            Some(("A U Thor <a@example.com>", 42, 0)),
            Some(("A U Thor <a@example.com>", 43, 0)),
            "snapshot",
        );
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.split('\n').collect();
        assert_eq!(lines[0], "tree 496d6428b9cf92981dc9495211e6e1120fb6f2ba");
        assert_eq!(lines[1], "parent e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
        assert_eq!(lines[2], "author A U Thor <a@example.com> 42 +0000");
        assert_eq!(lines[3], "committer A U Thor <a@example.com> 43 +0000");
        assert_eq!(lines[4], "");
        assert_eq!(lines[5], "snapshot");
    }

    #[test]
    fn root_commit_has_no_parent_line() {
        let tree =
            ObjectId::from_hex("496d6428b9cf92981dc9495211e6e1120fb6f2ba").unwrap();
        let buf = encode_commit(Some(&tree), None, None, None, "first");
        let text = String::from_utf8(buf).unwrap();
        assert!(!text.contains("parent"));
        assert!(text.starts_with("tree "));
        assert!(text.ends_with("\n\nfirst"));
    }
}
