//! Terminal equivalents of the export popup's copy and download buttons

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Result, anyhow};
use chrono::NaiveDate;
use tracing::{debug, info};

use crate::transcript::export_file_name;

/// Clipboard helpers tried in order; the first one that runs wins
const CLIPBOARD_COMMANDS: &[(&str, &[&str])] = &[
    ("pbcopy", &[]),
    ("wl-copy", &[]),
    ("xclip", &["-selection", "clipboard"]),
    ("xsel", &["--clipboard", "--input"]),
];

pub fn copy_to_clipboard(text: &str) -> Result<()> {
    copy_with(CLIPBOARD_COMMANDS, text).map(|_| ())
}

/// Pipe `text` into each helper in turn and return the one that took it.
/// A helper that can't start, hangs up early or exits non-zero is skipped.
fn copy_with(commands: &[(&'static str, &[&str])], text: &str) -> Result<&'static str> {
    for &(program, args) in commands {
        let mut child = match Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                debug!(program, error = %e, "clipboard helper unavailable");
                continue;
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(text.as_bytes()) {
                drop(stdin);
                let _ = child.wait();
                debug!(program, error = %e, "clipboard helper closed its input");
                continue;
            }
        }

        let status = match child.wait() {
            Ok(status) => status,
            Err(e) => {
                debug!(program, error = %e, "clipboard helper could not be waited on");
                continue;
            }
        };
        if status.success() {
            debug!(program, bytes = text.len(), "copied transcript to clipboard");
            return Ok(program);
        }
        debug!(program, %status, "clipboard helper failed");
    }

    let tried: Vec<&str> = commands.iter().map(|(program, _)| *program).collect();
    Err(anyhow!("no clipboard tool found (tried {})", tried.join(", ")))
}

/// Write the transcript as `Shadow_AI_Chat_<date>.txt` inside `dir`
pub fn save_transcript(dir: &Path, text: &str, date: NaiveDate) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(export_file_name(date));
    fs::write(&path, text)?;
    info!(path = %path.display(), "saved transcript");
    Ok(path)
}
