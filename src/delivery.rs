//! Delivery of the encoded file: an ordered chain of sinks tried in turn.
//!
//! On a touch-classified client the chain opens with a share-style
//! handoff and falls through to a plain file write; on anything else the
//! file write comes first. Exactly one terminal outcome surfaces per
//! export, and a failed sink must not leave a partial artifact behind.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{MatchcardError, MatchcardResult};

/// Where a successful delivery ended up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivered {
    /// Written to this path.
    File(PathBuf),
    /// Handed to an external share helper.
    Shared { program: String },
}

pub trait DeliverySink: Send + Sync {
    fn label(&self) -> &str;
    fn deliver(&self, bytes: &[u8], filename: &str) -> MatchcardResult<Delivered>;
}

/// Writes the file into a target directory. The write goes to a temp name
/// first and is renamed into place, so an interrupted delivery leaves
/// nothing behind.
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> DirectorySink {
        DirectorySink { dir: dir.into() }
    }
}

impl DeliverySink for DirectorySink {
    fn label(&self) -> &str {
        "download"
    }

    fn deliver(&self, bytes: &[u8], filename: &str) -> MatchcardResult<Delivered> {
        ensure_dir(&self.dir)?;
        let final_path = self.dir.join(filename);
        let tmp_path = self.dir.join(format!(".{filename}.part"));

        let write = || -> std::io::Result<()> {
            let mut f = std::fs::File::create(&tmp_path)?;
            f.write_all(bytes)?;
            f.sync_all()?;
            std::fs::rename(&tmp_path, &final_path)
        };
        if let Err(e) = write() {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(MatchcardError::delivery(format!(
                "write {}: {e}",
                final_path.display()
            )));
        }
        Ok(Delivered::File(final_path))
    }
}

fn ensure_dir(dir: &Path) -> MatchcardResult<()> {
    std::fs::create_dir_all(dir)
        .map_err(|e| MatchcardError::delivery(format!("create {}: {e}", dir.display())))
}

/// Pipes the encoded bytes to an external helper program's stdin, e.g. a
/// platform share handler. The filename is passed as the first argument.
pub struct CommandSink {
    program: String,
    args: Vec<String>,
}

impl CommandSink {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> CommandSink {
        CommandSink {
            program: program.into(),
            args,
        }
    }
}

impl DeliverySink for CommandSink {
    fn label(&self) -> &str {
        "share"
    }

    fn deliver(&self, bytes: &[u8], filename: &str) -> MatchcardResult<Delivered> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(filename)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| MatchcardError::delivery(format!("spawn {}: {e}", self.program)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| MatchcardError::delivery("share helper has no stdin"))?;
        stdin
            .write_all(bytes)
            .map_err(|e| MatchcardError::delivery(format!("pipe to {}: {e}", self.program)))?;
        drop(stdin);

        let status = child
            .wait()
            .map_err(|e| MatchcardError::delivery(format!("wait for {}: {e}", self.program)))?;
        if !status.success() {
            return Err(MatchcardError::delivery(format!(
                "{} exited with {status}",
                self.program
            )));
        }
        Ok(Delivered::Shared {
            program: self.program.clone(),
        })
    }
}

/// Ordered fall-through over delivery sinks.
pub struct DeliveryChain {
    sinks: Vec<Box<dyn DeliverySink>>,
}

impl DeliveryChain {
    pub fn new(sinks: Vec<Box<dyn DeliverySink>>) -> DeliveryChain {
        DeliveryChain { sinks }
    }

    /// Desktop-style delivery: straight to a directory write.
    pub fn download_to(dir: impl Into<PathBuf>) -> DeliveryChain {
        DeliveryChain::new(vec![Box::new(DirectorySink::new(dir))])
    }

    /// Touch-style delivery: share helper first, directory write as the
    /// manual-save fallback.
    pub fn share_then_download(
        program: impl Into<String>,
        args: Vec<String>,
        dir: impl Into<PathBuf>,
    ) -> DeliveryChain {
        DeliveryChain::new(vec![
            Box::new(CommandSink::new(program, args)),
            Box::new(DirectorySink::new(dir)),
        ])
    }

    /// Try each sink in order; the first success wins. Fails only when
    /// every sink has been tried.
    pub fn deliver(&self, bytes: &[u8], filename: &str) -> MatchcardResult<Delivered> {
        if self.sinks.is_empty() {
            return Err(MatchcardError::delivery("no delivery sinks configured"));
        }
        let mut errors = Vec::new();
        for sink in &self.sinks {
            match sink.deliver(bytes, filename) {
                Ok(delivered) => {
                    if !errors.is_empty() {
                        tracing::debug!(
                            sink = sink.label(),
                            skipped = errors.len(),
                            "delivery succeeded after fallthrough"
                        );
                    }
                    return Ok(delivered);
                }
                Err(e) => {
                    tracing::warn!(sink = sink.label(), error = %e, "delivery sink failed, trying next");
                    errors.push(format!("{}: {e}", sink.label()));
                }
            }
        }
        Err(MatchcardError::delivery(errors.join("; ")))
    }
}
