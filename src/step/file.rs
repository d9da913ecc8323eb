// ABOUTME: File steps: read a remote file, install text at a path, rewrite config keys.
// ABOUTME: Mutations take explicit parameters and return the keys they changed.

use crate::command::ShellCommand;
use crate::errno;
use crate::task::{Context, Input, Slot, Step, StepOutcome, StepResult};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Read a remote file into a slot.
#[derive(Debug, Clone)]
pub struct ReadFile {
    path: String,
    out: Slot<String>,
}

impl ReadFile {
    pub fn new(path: impl Into<String>, out: Slot<String>) -> Self {
        Self {
            path: path.into(),
            out,
        }
    }
}

#[async_trait]
impl Step for ReadFile {
    fn name(&self) -> &str {
        "read file"
    }

    fn mutates(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &mut Context) -> StepResult {
        // Privileged files are only readable through the escalated shell.
        let content = if ctx.options().sudo {
            ctx.execute(ShellCommand::cat(&self.path))
                .await
                .map_err(|e| e.to_coded(errno::READ_FILE_FAILED))?
        } else {
            let bytes = ctx
                .download(&self.path)
                .await
                .map_err(|e| errno::READ_FILE_FAILED.clue(e.to_string()))?;
            String::from_utf8(bytes)
                .map_err(|e| errno::DECODE_FAILED.clue(format!("{}: {e}", self.path)))?
        };
        ctx.blackboard_mut().insert(self.out, content);
        Ok(StepOutcome::Continue)
    }
}

/// Write text to a remote path.
///
/// Under privilege escalation the content is uploaded to a scratch file in
/// `/tmp` and moved into place with the escalated `mv`. The scratch file is
/// removed again when the move fails.
#[derive(Debug, Clone)]
pub struct InstallFile {
    content: Input<String>,
    path: String,
    mode: Option<String>,
    scratch_tag: Option<String>,
}

impl InstallFile {
    pub fn new(content: impl Into<Input<String>>, path: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            path: path.into(),
            mode: None,
            scratch_tag: None,
        }
    }

    pub fn mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    /// Distinguishes this install's scratch file, usually the service id.
    pub fn scratch_tag(mut self, tag: impl Into<String>) -> Self {
        self.scratch_tag = Some(tag.into());
        self
    }

    /// `/tmp/clusteradm-<tag>-<file name>`; without a tag the target's
    /// directory stands in for it.
    pub fn scratch_path(&self) -> String {
        let (dir, file) = self.path.rsplit_once('/').unwrap_or(("", &self.path));
        let tag = match &self.scratch_tag {
            Some(tag) => tag.clone(),
            None => dir.trim_matches('/').replace('/', "_"),
        };
        format!("/tmp/clusteradm-{tag}-{file}")
    }

    async fn install_escalated(&self, ctx: &Context, content: &str) -> Result<(), errno::CodedError> {
        let scratch = self.scratch_path();
        ctx.upload(content.as_bytes(), &scratch)
            .await
            .map_err(|e| errno::INSTALL_FILE_FAILED.clue(e.to_string()))?;
        let Err(e) = ctx.execute(ShellCommand::rename(&scratch, &self.path)).await else {
            return Ok(());
        };
        let cleanup = ShellCommand::remove([scratch.as_str()]).add_option("-f");
        if let Err(rm) = ctx.execute(cleanup).await {
            tracing::warn!(path = %scratch, error = %rm, "scratch file left behind");
        }
        Err(e.to_coded(errno::INSTALL_FILE_FAILED))
    }
}

#[async_trait]
impl Step for InstallFile {
    fn name(&self) -> &str {
        "install file"
    }

    async fn execute(&self, ctx: &mut Context) -> StepResult {
        let content = self.content.resolve(ctx.blackboard())?;

        if ctx.options().sudo {
            self.install_escalated(ctx, &content).await?;
        } else {
            ctx.upload(content.as_bytes(), &self.path)
                .await
                .map_err(|e| errno::INSTALL_FILE_FAILED.clue(e.to_string()))?;
        }

        if let Some(mode) = &self.mode {
            ctx.execute(ShellCommand::chmod(mode, &self.path))
                .await
                .map_err(|e| e.to_coded(errno::INSTALL_FILE_FAILED))?;
        }
        Ok(StepOutcome::Continue)
    }
}

/// What to do with one `key<delimiter>value` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutateAction {
    Keep,
    Replace(String),
    Remove,
}

/// Decides the fate of each config line. Implementations must be pure.
pub trait Mutation: Send + Sync {
    fn mutate(&self, key: &str, value: &str) -> MutateAction;

    /// Lines to append after the file has been scanned, given the keys seen.
    fn append(&self, _seen: &[String]) -> Vec<(String, String)> {
        Vec::new()
    }
}

impl<F> Mutation for F
where
    F: Fn(&str, &str) -> MutateAction + Send + Sync,
{
    fn mutate(&self, key: &str, value: &str) -> MutateAction {
        self(key, value)
    }
}

/// Replace the values of named keys.
#[derive(Debug, Clone, Default)]
pub struct ReplaceValues {
    values: BTreeMap<String, String>,
    append_missing: bool,
}

impl ReplaceValues {
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self {
            values,
            append_missing: false,
        }
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Also add keys the file does not contain yet.
    pub fn append_missing(mut self) -> Self {
        self.append_missing = true;
        self
    }
}

impl Mutation for ReplaceValues {
    fn mutate(&self, key: &str, value: &str) -> MutateAction {
        match self.values.get(key) {
            Some(new) if new != value => MutateAction::Replace(new.clone()),
            _ => MutateAction::Keep,
        }
    }

    fn append(&self, seen: &[String]) -> Vec<(String, String)> {
        if !self.append_missing {
            return Vec::new();
        }
        self.values
            .iter()
            .filter(|(k, _)| !seen.iter().any(|s| s == *k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Rewritten text plus the keys whose lines changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationResult {
    pub text: String,
    pub changed: Vec<String>,
}

/// Apply `mutation` to every `key<delimiter>value` line of `text`.
///
/// Comment lines (`#`), blank lines and lines without the delimiter pass
/// through untouched.
pub fn apply_mutation(text: &str, delimiter: &str, mutation: &dyn Mutation) -> MutationResult {
    let mut out = String::with_capacity(text.len());
    let mut changed = Vec::new();
    let mut seen = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim_start();
        let split = if trimmed.starts_with('#') || trimmed.is_empty() {
            None
        } else {
            line.split_once(delimiter)
        };
        let Some((raw_key, raw_value)) = split else {
            out.push_str(line);
            out.push('\n');
            continue;
        };

        let key = raw_key.trim();
        seen.push(key.to_string());
        match mutation.mutate(key, raw_value.trim()) {
            MutateAction::Keep => {
                out.push_str(line);
                out.push('\n');
            }
            MutateAction::Replace(value) => {
                out.push_str(&format!("{raw_key}{delimiter}{value}\n"));
                changed.push(key.to_string());
            }
            MutateAction::Remove => changed.push(key.to_string()),
        }
    }

    for (key, value) in mutation.append(&seen) {
        out.push_str(&format!("{key}{delimiter}{value}\n"));
        changed.push(key);
    }

    if !text.is_empty() && !text.ends_with('\n') {
        out.pop();
    }

    MutationResult { text: out, changed }
}

/// Read text from a slot, rewrite it, and store the result in another slot.
pub struct MutateConfig {
    source: Slot<String>,
    delimiter: String,
    mutation: Box<dyn Mutation>,
    out: Slot<String>,
    changed: Option<Slot<Vec<String>>>,
}

impl std::fmt::Debug for MutateConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutateConfig")
            .field("source", &self.source)
            .field("delimiter", &self.delimiter)
            .field("out", &self.out)
            .finish()
    }
}

impl MutateConfig {
    pub fn new(
        source: Slot<String>,
        delimiter: impl Into<String>,
        mutation: impl Mutation + 'static,
        out: Slot<String>,
    ) -> Self {
        Self {
            source,
            delimiter: delimiter.into(),
            mutation: Box::new(mutation),
            out,
            changed: None,
        }
    }

    pub fn record_changes(mut self, changed: Slot<Vec<String>>) -> Self {
        self.changed = Some(changed);
        self
    }
}

#[async_trait]
impl Step for MutateConfig {
    fn name(&self) -> &str {
        "mutate config"
    }

    fn mutates(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &mut Context) -> StepResult {
        let text = ctx.blackboard().require(self.source)?;
        let result = apply_mutation(text, &self.delimiter, self.mutation.as_ref());
        tracing::debug!(changed = ?result.changed, "config rewritten");
        let board = ctx.blackboard_mut();
        board.insert(self.out, result.text);
        if let Some(changed) = self.changed {
            board.insert(changed, result.changed);
        }
        Ok(StepOutcome::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ExecOptions;

    const CONF: &str = "# mds config\nmds.listen.addr=10.0.0.1:6700\nmds.etcd.endpoint=10.0.0.1:2379,10.0.0.2:2379\n\nlog.level=info\n";

    #[test]
    fn replace_changes_only_named_keys() {
        let mutation = ReplaceValues::default().set("mds.etcd.endpoint", "10.0.0.1:2379,10.0.0.3:2379");
        let result = apply_mutation(CONF, "=", &mutation);
        assert_eq!(result.changed, vec!["mds.etcd.endpoint"]);
        assert!(result.text.contains("mds.etcd.endpoint=10.0.0.1:2379,10.0.0.3:2379\n"));
        assert!(result.text.starts_with("# mds config\nmds.listen.addr=10.0.0.1:6700\n"));
        assert!(result.text.ends_with("\nlog.level=info\n"));
    }

    #[test]
    fn same_value_is_not_a_change() {
        let mutation = ReplaceValues::default().set("log.level", "info");
        let result = apply_mutation(CONF, "=", &mutation);
        assert!(result.changed.is_empty());
        assert_eq!(result.text, CONF);
    }

    #[test]
    fn closure_can_remove_lines() {
        let drop_log = |key: &str, _: &str| {
            if key.starts_with("log.") {
                MutateAction::Remove
            } else {
                MutateAction::Keep
            }
        };
        let result = apply_mutation(CONF, "=", &drop_log);
        assert!(!result.text.contains("log.level"));
        assert_eq!(result.changed, vec!["log.level"]);
    }

    #[test]
    fn append_missing_adds_keys() {
        let mutation = ReplaceValues::default().set("new.key", "1").append_missing();
        let result = apply_mutation("a=1\n", "=", &mutation);
        assert_eq!(result.text, "a=1\nnew.key=1\n");
    }

    #[test]
    fn yaml_style_delimiter() {
        let mutation = ReplaceValues::default().set("port", "2380");
        let result = apply_mutation("name: etcd0\nport: 2379\n", ": ", &mutation);
        assert_eq!(result.text, "name: etcd0\nport: 2380\n");
    }

    #[tokio::test]
    async fn mutate_step_reads_and_writes_slots() {
        const SRC: Slot<String> = Slot::new("src");
        const DST: Slot<String> = Slot::new("dst");
        const CHANGED: Slot<Vec<String>> = Slot::new("changed");
        let mut ctx = Context::new(None, ExecOptions::default());
        ctx.blackboard_mut().insert(SRC, "a=1\n".to_string());

        MutateConfig::new(SRC, "=", ReplaceValues::default().set("a", "2"), DST)
            .record_changes(CHANGED)
            .execute(&mut ctx)
            .await
            .unwrap();
        assert_eq!(ctx.blackboard().get(DST).unwrap(), "a=2\n");
        assert_eq!(ctx.blackboard().get(CHANGED).unwrap(), &vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn install_then_read_locally() {
        const READ: Slot<String> = Slot::new("read");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.conf").to_str().unwrap().to_string();
        let mut ctx = Context::new(None, ExecOptions::default());

        InstallFile::new("k=v\n", path.clone()).mode("600").execute(&mut ctx).await.unwrap();
        ReadFile::new(path, READ).execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.blackboard().get(READ).unwrap(), "k=v\n");
    }

    #[test]
    fn scratch_path_uses_tag_or_directory() {
        let tagged = InstallFile::new("x", "/data/etcd/conf/etcd.conf").scratch_tag("c1_etcd_h1_0");
        assert_eq!(tagged.scratch_path(), "/tmp/clusteradm-c1_etcd_h1_0-etcd.conf");
        let untagged = InstallFile::new("x", "/data/etcd/conf/etcd.conf");
        assert_eq!(untagged.scratch_path(), "/tmp/clusteradm-data_etcd_conf-etcd.conf");
    }

    #[tokio::test]
    async fn failed_escalated_move_removes_scratch_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("missing/app.conf").to_str().unwrap().to_string();
        let install = InstallFile::new("secret=1\n", target).scratch_tag("move-fails");
        // `env` stands in for sudo so the escalated path runs unprivileged.
        let options = ExecOptions::default().with_sudo(true).with_sudo_alias("env");
        let mut ctx = Context::new(None, options);

        let err = install.execute(&mut ctx).await.unwrap_err();
        assert_eq!(err.code, errno::INSTALL_FILE_FAILED);
        assert!(!std::path::Path::new(&install.scratch_path()).exists());
    }

    #[tokio::test]
    async fn install_from_missing_slot_fails_with_input_code() {
        let mut ctx = Context::new(None, ExecOptions::default());
        let err = InstallFile::new(Slot::<String>::new("nothing"), "/tmp/x")
            .execute(&mut ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code, errno::MISSING_STEP_INPUT);
    }
}
