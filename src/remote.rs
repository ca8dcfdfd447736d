//! Preview remote ref inspection and deletion via the git CLI.

use anyhow::Context;
use std::path::Path;
use tokio::process::Command;

/// A named git remote (or remote URL) holding the mirror refs. No local
/// copy of any ref is retained; every pass re-resolves from the remote.
pub struct Remote {
    name: String,
}

impl Remote {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    /// Resolve a refspec on the remote to its revision, or `None` if the
    /// ref does not exist.
    pub async fn get_revision(&self, refspec: &str) -> anyhow::Result<Option<String>> {
        let output = git(
            &["ls-remote", &self.name, &format!("refs/{refspec}")],
            None,
        )
        .await?;
        Ok(parse_ls_remote(&output))
    }

    /// Delete a refspec on the remote.
    ///
    /// `git push` only functions in the context of a valid repository even
    /// though the deletion involves no local objects, so the push is issued
    /// from a freshly initialized throwaway repository which is removed
    /// afterwards.
    pub async fn delete_ref(&self, refspec: &str) -> anyhow::Result<()> {
        tracing::info!(refspec, "deleting ref");

        let temp_repo = tempfile::tempdir().context("failed to create temporary repository")?;
        git(&["init"], Some(temp_repo.path())).await?;
        git(
            &["push", &self.name, "--delete", &format!("refs/{refspec}")],
            Some(temp_repo.path()),
        )
        .await?;
        Ok(())
    }
}

/// First field of the first `ls-remote` output line, if any.
fn parse_ls_remote(output: &str) -> Option<String> {
    output.split_whitespace().next().map(str::to_string)
}

/// Run one git subcommand, returning stdout. The error names the command
/// so "No such file or directory" always says what was missing.
async fn git(args: &[&str], cwd: Option<&Path>) -> anyhow::Result<String> {
    let mut command = Command::new("git");
    command.args(args);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let output = command
        .output()
        .await
        .map_err(|e| anyhow::anyhow!("failed to execute `git {}`: {e}", args.join(" ")))?;

    if !output.status.success() {
        anyhow::bail!(
            "`git {}` failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ls_remote_output_yields_revision() {
        assert_eq!(
            parse_ls_remote("a94a8fe5ccb19ba61c4c0873d391e987982fbbd3\trefs/prs-open/42\n"),
            Some("a94a8fe5ccb19ba61c4c0873d391e987982fbbd3".to_string())
        );
    }

    #[test]
    fn empty_ls_remote_output_means_absent_ref() {
        assert_eq!(parse_ls_remote(""), None);
        assert_eq!(parse_ls_remote("\n"), None);
    }
}
