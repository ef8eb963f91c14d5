//! Tree payload encoding and parsing.
//!
//! A tree is a concatenation of `"<octal-mode> <name>\0<20-byte-id>"`
//! records. Entries are ordered by a key that appends `/` to directory
//! names, so `foo` (a file) sorts before `foo.c` while `foo` (a directory)
//! sorts after `foo.c` — the ordering the upstream object format requires.

use bstr::{BString, ByteVec};

use bup_hash::ObjectId;

use crate::{ObjectError, ObjectType};

/// Mode bits marking a directory entry.
const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;

/// One `(mode, name, id)` record of a tree payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: u32,
    pub name: BString,
    pub oid: ObjectId,
}

impl TreeEntry {
    pub fn new(mode: u32, name: impl Into<BString>, oid: ObjectId) -> Self {
        Self {
            mode,
            name: name.into(),
            oid,
        }
    }

    /// Does the mode mark a directory?
    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    /// Sort key: the name, with `/` appended for directories.
    fn sort_key(&self) -> BString {
        let mut key = self.name.clone();
        if self.is_dir() {
            key.push_byte(b'/');
        }
        key
    }
}

/// Encode a tree payload, sorting the entries into canonical order.
pub fn encode_tree(mut entries: Vec<TreeEntry>) -> Vec<u8> {
    entries.sort_by_key(|e| e.sort_key());
    let mut out = Vec::new();
    for e in &entries {
        debug_assert!(e.mode != 0);
        debug_assert!(!e.name.is_empty());
        out.extend_from_slice(format!("{:o} ", e.mode).as_bytes());
        out.extend_from_slice(&e.name);
        out.push(0);
        out.extend_from_slice(e.oid.as_bytes());
    }
    out
}

/// Parse a tree payload into its records.
pub fn parse_tree(buf: &[u8]) -> Result<Vec<TreeEntry>, ObjectError> {
    let mut entries = Vec::new();
    let mut ofs = 0;
    while ofs < buf.len() {
        let nul = buf[ofs..]
            .iter()
            .position(|&b| b == 0)
            .ok_or(ObjectError::MalformedPayload {
                kind: "tree",
                offset: ofs,
            })?;
        let head = &buf[ofs..ofs + nul];
        let sp = head
            .iter()
            .position(|&b| b == b' ')
            .ok_or(ObjectError::MalformedPayload {
                kind: "tree",
                offset: ofs,
            })?;
        let mode = parse_octal(&head[..sp]).ok_or(ObjectError::MalformedPayload {
            kind: "tree",
            offset: ofs,
        })?;
        let name = BString::from(&head[sp + 1..]);
        if name.is_empty() {
            return Err(ObjectError::MalformedPayload {
                kind: "tree",
                offset: ofs,
            });
        }

        let id_start = ofs + nul + 1;
        let id_end = id_start + 20;
        if id_end > buf.len() {
            return Err(ObjectError::Truncated);
        }
        let oid = ObjectId::from_bytes(&buf[id_start..id_end]).expect("20-byte slice");

        entries.push(TreeEntry { mode, name, oid });
        ofs = id_end;
    }
    Ok(entries)
}

fn parse_octal(s: &[u8]) -> Option<u32> {
    if s.is_empty() {
        return None;
    }
    let mut val: u32 = 0;
    for &b in s {
        if !(b'0'..=b'7').contains(&b) {
            return None;
        }
        val = val.checked_mul(8)?.checked_add(u32::from(b - b'0'))?;
    }
    Some(val)
}

/// Extract the tree id from a commit payload (its first line).
pub fn commit_tree_id(commit: &[u8]) -> Result<ObjectId, ObjectError> {
    let line_end = commit
        .iter()
        .position(|&b| b == b'\n')
        .unwrap_or(commit.len());
    let line = &commit[..line_end];
    let hex = line
        .strip_prefix(b"tree ")
        .ok_or(ObjectError::MalformedPayload {
            kind: "commit",
            offset: 0,
        })?;
    let hex = std::str::from_utf8(hex).map_err(|_| ObjectError::MalformedPayload {
        kind: "commit",
        offset: 5,
    })?;
    ObjectId::from_hex(hex).map_err(|_| ObjectError::MalformedPayload {
        kind: "commit",
        offset: 5,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc_hash;

    fn oid(n: u8) -> ObjectId {
        let mut bytes = [0u8; 20];
        bytes[19] = n;
        ObjectId(bytes)
    }

    #[test]
    fn encode_then_parse() {
        let entries = vec![
            TreeEntry::new(0o100644, "b.txt", oid(1)),
            TreeEntry::new(0o40000, "a", oid(2)),
        ];
        let buf = encode_tree(entries.clone());
        let parsed = parse_tree(&buf).unwrap();
        assert_eq!(parsed.len(), 2);
        assert!(parsed.iter().any(|e| e.name == "a" && e.is_dir()));
        assert!(parsed.iter().any(|e| e.name == "b.txt" && !e.is_dir()));
    }

    #[test]
    fn directories_sort_with_trailing_slash() {
        // "foo" as a file sorts before "foo.x"; "foo" as a directory
        // sorts after "foo.txt" because its key is "foo/".
        let file_first = encode_tree(vec![
            TreeEntry::new(0o100644, "foo.x", oid(1)),
            TreeEntry::new(0o100644, "foo", oid(2)),
        ]);
        let parsed = parse_tree(&file_first).unwrap();
        assert_eq!(parsed[0].name, "foo");
        assert_eq!(parsed[1].name, "foo.x");

        let dir_last = encode_tree(vec![
            TreeEntry::new(0o100644, "foo.txt", oid(1)),
            TreeEntry::new(0o40000, "foo", oid(2)),
        ]);
        let parsed = parse_tree(&dir_last).unwrap();
        assert_eq!(parsed[0].name, "foo.txt");
        assert_eq!(parsed[1].name, "foo");
    }

    #[test]
    fn matches_known_git_tree_hash() {
        // Tree containing the empty blob as "a": verified against
        // `git mktree`.
        let empty_blob =
            ObjectId::from_hex("e69de29bb2d1d6434b8b29ae775ad8c2e48c5391").unwrap();
        let buf = encode_tree(vec![TreeEntry::new(0o100644, "a", empty_blob)]);
        assert_eq!(
            calc_hash(ObjectType::Tree, &buf).to_hex(),
            "496d6428b9cf92981dc9495211e6e1120fb6f2ba"
        );
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_tree(b"no nul here").is_err());
        assert!(parse_tree(b"100644 f\0short").is_err());
        assert!(parse_tree(b"xyz f\0aaaaaaaaaaaaaaaaaaaa").is_err());
    }

    #[test]
    fn commit_tree_line() {
        let commit = b"tree 496d6428b9cf92981dc9495211e6e1120fb6f2ba\nauthor a <a@b> 0 +0000\n\nmsg";
        let id = commit_tree_id(commit).unwrap();
        assert_eq!(id.to_hex(), "496d6428b9cf92981dc9495211e6e1120fb6f2ba");
        assert!(commit_tree_id(b"parent deadbeef\n").is_err());
    }
}
