//! End-to-end client/server exchanges over a socketpair, with the server
//! loop on a thread. Requires a real `git` for pack finalisation, so
//! every test bails out quietly when git is missing.

use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use bup_net::{serve, Client, Conn, NetError};
use bup_object::{calc_hash, ObjectType};

fn git_available() -> bool {
    bup_repo::git_version().is_ok()
}

struct Harness {
    client: Client,
    server: JoinHandle<Result<(), NetError>>,
    repo_dir: PathBuf,
    _tmp: tempfile::TempDir,
}

fn start(create: bool) -> Harness {
    let tmp = tempfile::tempdir().unwrap();
    let repo_dir = tmp.path().join("srv");
    if !create {
        bup_repo::Repository::init(Some(&repo_dir)).unwrap();
    }
    let cachedir = tmp.path().join("cache");

    let (cs, ss) = UnixStream::pair().unwrap();
    let server =
        std::thread::spawn(move || serve(Conn::new(ss.try_clone().unwrap(), ss)));
    let client = Client::from_streams(
        cs.try_clone().unwrap(),
        cs,
        cachedir,
        repo_dir.to_str().unwrap(),
        create,
    )
    .unwrap();
    Harness {
        client,
        server,
        repo_dir,
        _tmp: tmp,
    }
}

fn idx_files(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    if let Ok(rd) = std::fs::read_dir(dir) {
        for entry in rd {
            let path = entry.unwrap().path();
            if path.extension().and_then(|e| e.to_str()) == Some("idx") {
                found.push(path);
            }
        }
    }
    found.sort();
    found
}

#[test]
fn receive_objects_refs_and_quit() {
    if !git_available() {
        return;
    }
    let h = start(true);

    // Ship a pack with three blobs plus the tree and commit over them.
    h.client.sync_indexes().unwrap();
    let mut pw = h.client.new_packwriter().unwrap();
    let a = pw.new_blob(b"").unwrap();
    let b = pw.new_blob(b"a").unwrap();
    let c = pw.new_blob(b"abc").unwrap();
    assert_eq!(pw.count(), 3);
    let tree = pw
        .new_tree(vec![
            bup_object::tree::TreeEntry::new(0o100644, "empty", a),
            bup_object::tree::TreeEntry::new(0o100644, "one", b),
            bup_object::tree::TreeEntry::new(0o100644, "three", c),
        ])
        .unwrap();
    let commit = pw.new_commit(None, Some(&tree), "snapshot").unwrap();
    pw.close().unwrap();

    assert_eq!(a, calc_hash(ObjectType::Blob, b""));

    // The server finalised the pack into its object store.
    let idxes = idx_files(&h.repo_dir.join("objects/pack"));
    assert_eq!(idxes.len(), 1);
    let idx = bup_pack::index::PackIndex::open(&idxes[0]).unwrap();
    for oid in [&a, &b, &c, &tree, &commit] {
        assert!(idx.contains(oid));
    }

    // Refs: absent, then compare-and-swap from nothing.
    assert_eq!(h.client.read_ref("refs/heads/main").unwrap(), None);
    h.client.update_ref("refs/heads/main", &commit, None).unwrap();
    assert_eq!(h.client.read_ref("refs/heads/main").unwrap(), Some(commit));

    h.client.close().unwrap();
    h.server.join().unwrap().unwrap();
}

#[test]
fn synced_index_matches_server_byte_for_byte() {
    if !git_available() {
        return;
    }
    let h = start(true);

    h.client.sync_indexes().unwrap();
    let mut pw = h.client.new_packwriter().unwrap();
    pw.new_blob(b"index me").unwrap();
    pw.close().unwrap();

    // Second sync fetches the new index into the cache.
    h.client.sync_indexes().unwrap();

    let server_idx = idx_files(&h.repo_dir.join("objects/pack"));
    assert_eq!(server_idx.len(), 1);
    let name = server_idx[0].file_name().unwrap();
    let cached = h._tmp.path().join("cache").join(name);
    assert_eq!(
        std::fs::read(&cached).unwrap(),
        std::fs::read(&server_idx[0]).unwrap()
    );

    h.client.close().unwrap();
    h.server.join().unwrap().unwrap();
}

#[test]
fn dedup_avoids_resending_synced_objects() {
    if !git_available() {
        return;
    }
    let h = start(true);

    h.client.sync_indexes().unwrap();
    let mut pw = h.client.new_packwriter().unwrap();
    pw.new_blob(b"shared").unwrap();
    pw.close().unwrap();

    h.client.sync_indexes().unwrap();
    let mut pw = h.client.new_packwriter().unwrap();
    let again = pw.new_blob(b"shared").unwrap();
    assert_eq!(again, calc_hash(ObjectType::Blob, b"shared"));
    assert_eq!(pw.count(), 0); // nothing shipped
    let fresh = pw.new_blob(b"novel").unwrap();
    assert_eq!(pw.count(), 1);
    pw.close().unwrap();

    let idxes = idx_files(&h.repo_dir.join("objects/pack"));
    assert_eq!(idxes.len(), 2);
    let newest: Vec<_> = idxes
        .iter()
        .map(|p| bup_pack::index::PackIndex::open(p).unwrap())
        .collect();
    assert!(newest.iter().any(|ix| ix.contains(&fresh)));

    h.client.close().unwrap();
    h.server.join().unwrap().unwrap();
}

#[test]
fn cat_streams_object_content() {
    if !git_available() {
        return;
    }
    let h = start(true);

    h.client.sync_indexes().unwrap();
    let mut pw = h.client.new_packwriter().unwrap();
    let payload = vec![0x42u8; 200_000]; // spans multiple frames
    let oid = pw.new_blob(&payload).unwrap();
    pw.close().unwrap();

    let mut out = Vec::new();
    h.client.cat(&oid.to_hex(), &mut out).unwrap();
    assert_eq!(out, payload);

    h.client.close().unwrap();
    h.server.join().unwrap().unwrap();
}

#[test]
fn busy_interlock_blocks_until_cat_drains() {
    if !git_available() {
        return;
    }
    let h = start(true);

    h.client.sync_indexes().unwrap();
    let mut pw = h.client.new_packwriter().unwrap();
    let oid = pw.new_blob(b"stream me").unwrap();
    pw.close().unwrap();

    let mut stream = h.client.cat_start(&oid.to_hex()).unwrap();

    // Mid-stream, every other command must refuse.
    match h.client.read_ref("refs/heads/main") {
        Err(NetError::Busy(cmd)) => assert_eq!(cmd, "cat"),
        other => panic!("expected busy, got {other:?}"),
    }
    assert!(matches!(h.client.sync_indexes(), Err(NetError::Busy(_))));
    assert!(matches!(
        h.client.new_packwriter(),
        Err(NetError::Busy(_))
    ));

    let mut out = Vec::new();
    while let Some(chunk) = stream.next_chunk().unwrap() {
        out.extend_from_slice(&chunk);
    }
    assert_eq!(out, b"stream me");

    // Draining the terminator re-enables commands.
    assert_eq!(h.client.read_ref("refs/heads/main").unwrap(), None);

    h.client.close().unwrap();
    h.server.join().unwrap().unwrap();
}

#[test]
fn packwriter_requires_synced_indexes() {
    if !git_available() {
        return;
    }
    let h = start(true);
    assert!(matches!(
        h.client.new_packwriter(),
        Err(NetError::IndexesNotSynced)
    ));
    h.client.close().unwrap();
    h.server.join().unwrap().unwrap();
}

#[test]
fn set_dir_on_existing_repository() {
    if !git_available() {
        return;
    }
    let h = start(false); // repository pre-initialised, plain set-dir
    assert_eq!(h.client.read_ref("refs/heads/x").unwrap(), None);
    h.client.close().unwrap();
    h.server.join().unwrap().unwrap();
}
