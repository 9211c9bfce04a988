#![allow(dead_code)]

use confgraph_core::cache::InMemoryConfigCache;
use confgraph_core::db::open_db_in_memory;
use confgraph_core::service::{Collaborators, PublishOptions};
use confgraph_core::sync::{MemoryObjectStore, MirrorError, MirrorRepository, NamedLocks, PublishOutcome};
use confgraph_core::ConfigGraph;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use walkdir::WalkDir;

/// Snapshot of a working tree: relative path -> bytes.
pub type Tree = BTreeMap<String, Vec<u8>>;

/// Mirror that keeps the "remote" in memory.
///
/// `checkout` writes the last published tree into the workdir, `publish`
/// snapshots the workdir as the new remote state.
#[derive(Default)]
pub struct RecordingMirror {
    pub fail_checkout: bool,
    pub fail_publish: bool,
    pub checkouts: Mutex<Vec<(String, PathBuf)>>,
    pub published: Mutex<Vec<Tree>>,
}

impl RecordingMirror {
    pub fn failing_publish() -> Self {
        Self {
            fail_publish: true,
            ..Self::default()
        }
    }

    pub fn last_tree(&self) -> Option<Tree> {
        self.published.lock().last().cloned()
    }

    pub fn publish_count(&self) -> usize {
        self.published.lock().len()
    }
}

impl MirrorRepository for RecordingMirror {
    fn checkout(&self, url: &str, workdir: &Path) -> Result<(), MirrorError> {
        self.checkouts.lock().push((url.to_string(), workdir.to_path_buf()));
        if self.fail_checkout {
            return Err(MirrorError::Unavailable("remote unreachable".to_string()));
        }
        fs::create_dir_all(workdir).map_err(|err| MirrorError::Unavailable(err.to_string()))?;
        if let Some(tree) = self.last_tree() {
            write_tree(workdir, &tree);
        }
        Ok(())
    }

    fn publish(&self, workdir: &Path, _message: &str) -> Result<PublishOutcome, MirrorError> {
        if self.fail_publish {
            return Err(MirrorError::CommandFailed {
                command: "git push origin HEAD".to_string(),
                stderr: "rejected".to_string(),
            });
        }
        let tree = read_tree(workdir);
        let mut published = self.published.lock();
        if published.last() == Some(&tree) {
            return Ok(PublishOutcome::Unchanged);
        }
        published.push(tree);
        Ok(PublishOutcome::Pushed {
            commit: format!("commit-{}", published.len()),
        })
    }
}

pub struct Harness {
    pub graph: ConfigGraph,
    pub cache: Arc<InMemoryConfigCache>,
    pub objects: Arc<MemoryObjectStore>,
    pub mirror: Arc<RecordingMirror>,
    pub scratch: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_mirror(RecordingMirror::default())
    }

    pub fn with_mirror(mirror: RecordingMirror) -> Self {
        let cache = Arc::new(InMemoryConfigCache::new());
        let objects = Arc::new(MemoryObjectStore::new());
        let mirror = Arc::new(mirror);
        let scratch = tempfile::tempdir().unwrap();
        let collaborators = Collaborators {
            cache: cache.clone(),
            object_store: objects.clone(),
            mirror: mirror.clone(),
            locks: Arc::new(NamedLocks::new()),
        };
        let publish = PublishOptions {
            scratch_root: Some(scratch.path().to_path_buf()),
            ..PublishOptions::default()
        };
        let graph = ConfigGraph::with_connection(open_db_in_memory().unwrap(), collaborators, publish).unwrap();
        Self {
            graph,
            cache,
            objects,
            mirror,
            scratch,
        }
    }

    /// Entries left under the scratch root.
    pub fn scratch_entries(&self) -> usize {
        fs::read_dir(self.scratch.path()).unwrap().count()
    }
}

pub fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

pub fn write_tree(root: &Path, tree: &Tree) {
    for (relative, bytes) in tree {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, bytes).unwrap();
    }
}

pub fn read_tree(root: &Path) -> Tree {
    let mut tree = Tree::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.unwrap();
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap()
            .to_string_lossy()
            .replace('\\', "/");
        tree.insert(relative, fs::read(entry.path()).unwrap());
    }
    tree
}

/// Two root sections `CM` and `Billing System`, the latter holding `SQL`
/// with the `SQL_GPARAMS` process. Returns the root document path.
pub fn write_billing_flow(dir: &Path) -> PathBuf {
    let flow = dir.join("flow");
    write_file(
        &flow.join("Flow.json"),
        r#"{
  "commonConfiguration": { "stopOnFailure": true, "retries": 1, "variables": { "ENV": "test" } },
  "headerConfiguration": { "title": "Billing", "fields": {} },
  "potHeaderConfiguration": { "enabled": false, "columns": [] },
  "defaultTarget": "billing-host",
  "sections": [
    { "name": "CM", "processes": [ { "execType": "process", "pathToFile": "SSH_BG.json" } ] },
    {
      "name": "Billing System",
      "sections": [
        { "name": "SQL", "processes": [ { "type": "config", "template": "SQL_GPARAMS" } ] }
      ]
    }
  ]
}"#,
    );
    write_file(
        &flow.join("SSH_BG.json"),
        r#"{ "name": "SSH_BG", "executionTarget": "ssh-gateway", "command": { "ssh": "uptime" } }"#,
    );
    write_file(
        &flow.join("SQL_GPARAMS.json"),
        r#"{ "name": "SQL_GPARAMS", "command": { "sql": "select * from gparams" }, "inputs": [], "validations": [] }"#,
    );
    flow.join("Flow.json")
}
