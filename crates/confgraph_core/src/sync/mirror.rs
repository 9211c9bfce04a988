//! Version-controlled mirror repository seam and its git implementation.

use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

#[derive(Debug)]
pub enum MirrorError {
    /// The git binary could not be started.
    Spawn {
        command: String,
        source: std::io::Error,
    },
    /// A git command exited unsuccessfully.
    CommandFailed { command: String, stderr: String },
    /// Mirror is not usable (bad url, missing checkout, injected failure).
    Unavailable(String),
}

impl Display for MirrorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spawn { command, source } => write!(f, "cannot run `{command}`: {source}"),
            Self::CommandFailed { command, stderr } => write!(f, "`{command}` failed: {stderr}"),
            Self::Unavailable(message) => write!(f, "mirror unavailable: {message}"),
        }
    }
}

impl Error for MirrorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Spawn { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// What a publish did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// A commit was created and pushed.
    Pushed { commit: String },
    /// The rendered tree matched the checkout; nothing was committed.
    Unchanged,
}

/// Working-copy operations the synchronizer needs from a mirror repository.
pub trait MirrorRepository: Send + Sync {
    /// Clones `url` into the empty directory `workdir`.
    fn checkout(&self, url: &str, workdir: &Path) -> Result<(), MirrorError>;
    /// Commits every change under `workdir` and pushes it.
    fn publish(&self, workdir: &Path, message: &str) -> Result<PublishOutcome, MirrorError>;
}

/// Commit identity and target branch for published changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitIdentity {
    pub branch: Option<String>,
    pub author_name: String,
    pub author_email: String,
}

impl Default for GitIdentity {
    fn default() -> Self {
        Self {
            branch: None,
            author_name: "confgraph".to_string(),
            author_email: "confgraph@localhost".to_string(),
        }
    }
}

/// Mirror backed by the `git` command-line client.
#[derive(Debug, Clone, Default)]
pub struct GitMirror {
    identity: GitIdentity,
    git_binary: Option<PathBuf>,
}

impl GitMirror {
    pub fn new(identity: GitIdentity) -> Self {
        Self {
            identity,
            git_binary: None,
        }
    }

    /// Uses a specific git executable instead of the one on `PATH`.
    pub fn with_git_binary(mut self, git_binary: impl Into<PathBuf>) -> Self {
        self.git_binary = Some(git_binary.into());
        self
    }

    fn command(&self) -> Command {
        match &self.git_binary {
            Some(binary) => Command::new(binary),
            None => Command::new("git"),
        }
    }

    fn clone_args<'a>(&'a self, url: &'a str, target: &'a str) -> Vec<&'a str> {
        let mut args = vec!["clone", "--depth", "1"];
        if let Some(branch) = self.identity.branch.as_deref() {
            args.extend(["--branch", branch]);
        }
        args.extend(["--", url, target]);
        args
    }

    fn run(&self, workdir: Option<&Path>, args: &[&str]) -> Result<String, MirrorError> {
        let mut command = self.command();
        if let Some(workdir) = workdir {
            command.arg("-C").arg(workdir);
        }
        command
            .args(["-c", &format!("user.name={}", self.identity.author_name)])
            .args(["-c", &format!("user.email={}", self.identity.author_email)])
            .args(args);
        let rendered = format!("git {}", args.join(" "));
        let output: Output = command.output().map_err(|source| MirrorError::Spawn {
            command: rendered.clone(),
            source,
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(MirrorError::CommandFailed {
                command: rendered,
                stderr,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl MirrorRepository for GitMirror {
    fn checkout(&self, url: &str, workdir: &Path) -> Result<(), MirrorError> {
        let url = checked_url(url)?;
        let target = workdir.to_string_lossy().into_owned();
        self.run(None, &self.clone_args(url, &target))?;
        Ok(())
    }

    fn publish(&self, workdir: &Path, message: &str) -> Result<PublishOutcome, MirrorError> {
        self.run(Some(workdir), &["add", "--all"])?;
        let status = self.run(Some(workdir), &["status", "--porcelain=1"])?;
        if status.is_empty() {
            info!("event=mirror_publish module=sync status=ok outcome=unchanged");
            return Ok(PublishOutcome::Unchanged);
        }
        self.run(Some(workdir), &["commit", "--quiet", "-m", message])?;
        let commit = self.run(Some(workdir), &["rev-parse", "HEAD"])?;
        let refspec = match self.identity.branch.as_deref() {
            Some(branch) => format!("HEAD:{branch}"),
            None => "HEAD".to_string(),
        };
        if let Err(err) = self.run(Some(workdir), &["push", "origin", refspec.as_str()]) {
            warn!("event=mirror_publish module=sync status=error commit={commit} error={err}");
            return Err(err);
        }
        info!("event=mirror_publish module=sync status=ok outcome=pushed commit={commit}");
        Ok(PublishOutcome::Pushed { commit })
    }
}

/// Trims `url` and rejects values git would read as an option.
pub fn checked_url(url: &str) -> Result<&str, MirrorError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(MirrorError::Unavailable("empty repository url".to_string()));
    }
    if url.starts_with('-') {
        return Err(MirrorError::Unavailable(format!("repository url must not start with '-': {url}")));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_that_look_like_options_are_rejected() {
        assert!(matches!(
            checked_url("--upload-pack=touch /tmp/x;:"),
            Err(MirrorError::Unavailable(_))
        ));
        assert!(checked_url("   ").is_err());
        assert_eq!(checked_url(" https://git.example.test/flow.git ").unwrap(), "https://git.example.test/flow.git");

        let workdir = tempfile::tempdir().unwrap();
        let mirror = GitMirror::default().with_git_binary(workdir.path().join("missing-git"));
        let err = mirror.checkout("-c core.sshCommand=x", workdir.path()).unwrap_err();
        assert!(matches!(err, MirrorError::Unavailable(_)));
    }

    #[test]
    fn clone_separates_the_url_from_options() {
        let mirror = GitMirror::new(GitIdentity {
            branch: Some("main".to_string()),
            ..GitIdentity::default()
        });
        let args = mirror.clone_args("https://git.example.test/flow.git", "/tmp/checkout");
        assert_eq!(
            args,
            vec![
                "clone",
                "--depth",
                "1",
                "--branch",
                "main",
                "--",
                "https://git.example.test/flow.git",
                "/tmp/checkout",
            ]
        );
    }
}
