// ABOUTME: Steps wrapping single shell verbs (mkdir, rm, ls) and opaque command lines.
// ABOUTME: Each maps a failed command to its own error code with the output as clue.

use crate::command::{RawCommand, ShellCommand};
use crate::errno::{self, ErrorCode};
use crate::task::{Context, Slot, Step, StepOutcome, StepResult};
use crate::transport::ExecOptions;
use async_trait::async_trait;

/// `mkdir -p` for every path.
#[derive(Debug, Clone)]
pub struct CreateDirectories {
    paths: Vec<String>,
}

impl CreateDirectories {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl Step for CreateDirectories {
    fn name(&self) -> &str {
        "create directories"
    }

    async fn execute(&self, ctx: &mut Context) -> StepResult {
        if self.paths.is_empty() {
            return Ok(StepOutcome::Continue);
        }
        ctx.execute(ShellCommand::mkdir(&self.paths).add_option("-p"))
            .await
            .map_err(|e| e.to_coded(errno::CREATE_DIRECTORY_FAILED))?;
        Ok(StepOutcome::Continue)
    }
}

/// `rm -rf` for every path. Refuses `/` and empty paths.
#[derive(Debug, Clone)]
pub struct RemoveFiles {
    paths: Vec<String>,
}

impl RemoveFiles {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl Step for RemoveFiles {
    fn name(&self) -> &str {
        "remove files"
    }

    async fn execute(&self, ctx: &mut Context) -> StepResult {
        if let Some(bad) = self
            .paths
            .iter()
            .find(|p| p.trim().is_empty() || p.trim().trim_end_matches('/').is_empty())
        {
            return Err(errno::REMOVE_FILE_FAILED.clue(format!("refusing to remove '{bad}'")));
        }
        if self.paths.is_empty() {
            return Ok(StepOutcome::Continue);
        }
        ctx.execute(ShellCommand::remove(&self.paths).add_option("-rf"))
            .await
            .map_err(|e| e.to_coded(errno::REMOVE_FILE_FAILED))?;
        Ok(StepOutcome::Continue)
    }
}

/// `ls -1` into a slot, one entry per element.
#[derive(Debug, Clone)]
pub struct ListDirectory {
    path: String,
    out: Slot<Vec<String>>,
}

impl ListDirectory {
    pub fn new(path: impl Into<String>, out: Slot<Vec<String>>) -> Self {
        Self {
            path: path.into(),
            out,
        }
    }
}

#[async_trait]
impl Step for ListDirectory {
    fn name(&self) -> &str {
        "list directory"
    }

    fn mutates(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &mut Context) -> StepResult {
        let output = ctx
            .execute(ShellCommand::list(&self.path).add_option("-1"))
            .await
            .map_err(|e| e.to_coded(errno::READ_FILE_FAILED))?;
        let entries = output
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();
        ctx.blackboard_mut().insert(self.out, entries);
        Ok(StepOutcome::Continue)
    }
}

/// Run an opaque command line, optionally capturing its output.
#[derive(Debug, Clone)]
pub struct RunCommand {
    name: String,
    command: String,
    options: Option<ExecOptions>,
    out: Option<Slot<String>>,
    on_failure: ErrorCode,
}

impl RunCommand {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            options: None,
            out: None,
            on_failure: errno::COMMAND_FAILED,
        }
    }

    /// Run with these options instead of the Task's.
    pub fn options(mut self, options: ExecOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn capture(mut self, out: Slot<String>) -> Self {
        self.out = Some(out);
        self
    }

    pub fn on_failure(mut self, code: ErrorCode) -> Self {
        self.on_failure = code;
        self
    }
}

#[async_trait]
impl Step for RunCommand {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &mut Context) -> StepResult {
        let options = self.options.clone().unwrap_or_else(|| ctx.options().clone());
        let output = ctx
            .execute_with(RawCommand(self.command.clone()), &options)
            .await
            .map_err(|e| e.to_coded(self.on_failure))?;
        if let Some(out) = self.out {
            ctx.blackboard_mut().insert(out, output);
        }
        Ok(StepOutcome::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn remove_refuses_root() {
        let mut ctx = Context::new(None, ExecOptions::default());
        for path in ["/", "", "  ", "//"] {
            let err = RemoveFiles::new([path]).execute(&mut ctx).await.unwrap_err();
            assert_eq!(err.code, errno::REMOVE_FILE_FAILED);
        }
    }

    #[tokio::test]
    async fn create_list_remove_locally() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_str().unwrap().to_string();
        let mut ctx = Context::new(None, ExecOptions::default());
        let entries: Slot<Vec<String>> = Slot::new("entries");

        CreateDirectories::new([format!("{base}/a/b"), format!("{base}/c")])
            .execute(&mut ctx)
            .await
            .unwrap();
        ListDirectory::new(base.clone(), entries)
            .execute(&mut ctx)
            .await
            .unwrap();
        assert_eq!(ctx.blackboard().get(entries).unwrap(), &vec!["a".to_string(), "c".to_string()]);

        RemoveFiles::new([format!("{base}/a")]).execute(&mut ctx).await.unwrap();
        assert!(!dir.path().join("a").exists());
    }

    #[tokio::test]
    async fn run_command_captures_output() {
        let mut ctx = Context::new(None, ExecOptions::default());
        let out: Slot<String> = Slot::new("out");
        RunCommand::new("echo", "echo captured")
            .capture(out)
            .execute(&mut ctx)
            .await
            .unwrap();
        assert_eq!(ctx.blackboard().get(out).unwrap().trim(), "captured");
    }

    #[tokio::test]
    async fn run_command_failure_uses_configured_code() {
        let mut ctx = Context::new(None, ExecOptions::default());
        let err = RunCommand::new("fail", "echo nope; exit 1")
            .on_failure(errno::PORT_IN_USE)
            .execute(&mut ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code, errno::PORT_IN_USE);
        assert_eq!(err.clue.as_deref().map(str::trim), Some("nope"));
    }
}
