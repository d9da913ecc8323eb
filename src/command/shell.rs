// ABOUTME: Shell command builder with one template per verb.
// ABOUTME: Options accumulate fluently and render immediately before dispatch.

use super::template::{TemplateError, render};
use super::{CommandBuilder, shell_quote};
use crate::transport::ExecOptions;
use std::collections::BTreeMap;

/// Shell verbs understood by [`ShellCommand`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellVerb {
    Mkdir,
    Remove,
    Move,
    Chmod,
    Cat,
    List,
    Stat,
    Uname,
    Date,
    Command,
}

impl ShellVerb {
    fn template(&self) -> &'static str {
        match self {
            ShellVerb::Mkdir => "mkdir {options}{paths}",
            ShellVerb::Remove => "rm {options}{paths}",
            ShellVerb::Move => "mv {options}{source} {destination}",
            ShellVerb::Chmod => "chmod {options}{mode} {paths}",
            ShellVerb::Cat => "cat {options}{paths}",
            ShellVerb::List => "ls {options}{paths}",
            ShellVerb::Stat => "stat {options}{paths}",
            ShellVerb::Uname => "uname {options}",
            ShellVerb::Date => "date {options}",
            ShellVerb::Command => "{command}",
        }
    }
}

/// Builder for one shell command.
#[derive(Debug, Clone)]
#[must_use = "a command builder does nothing until built"]
pub struct ShellCommand {
    verb: ShellVerb,
    options: Vec<String>,
    data: BTreeMap<&'static str, String>,
}

impl ShellCommand {
    fn new(verb: ShellVerb) -> Self {
        Self {
            verb,
            options: Vec::new(),
            data: BTreeMap::new(),
        }
    }

    fn with(mut self, key: &'static str, value: String) -> Self {
        self.data.insert(key, value);
        self
    }

    fn with_paths<I, S>(self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = paths
            .into_iter()
            .map(|p| shell_quote(p.as_ref()))
            .collect::<Vec<_>>()
            .join(" ");
        self.with("paths", joined)
    }

    pub fn mkdir<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(ShellVerb::Mkdir).with_paths(paths)
    }

    pub fn remove<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(ShellVerb::Remove).with_paths(paths)
    }

    pub fn rename(source: &str, destination: &str) -> Self {
        Self::new(ShellVerb::Move)
            .with("source", shell_quote(source))
            .with("destination", shell_quote(destination))
    }

    pub fn chmod(mode: &str, path: &str) -> Self {
        Self::new(ShellVerb::Chmod)
            .with("mode", shell_quote(mode))
            .with_paths([path])
    }

    pub fn cat(path: &str) -> Self {
        Self::new(ShellVerb::Cat).with_paths([path])
    }

    pub fn list(path: &str) -> Self {
        Self::new(ShellVerb::List).with_paths([path])
    }

    pub fn stat(path: &str) -> Self {
        Self::new(ShellVerb::Stat).with_paths([path])
    }

    pub fn uname() -> Self {
        Self::new(ShellVerb::Uname)
    }

    pub fn date() -> Self {
        Self::new(ShellVerb::Date)
    }

    /// An arbitrary command line, passed through as-is.
    pub fn command(line: impl Into<String>) -> Self {
        Self::new(ShellVerb::Command).with("command", line.into())
    }

    pub fn verb(&self) -> ShellVerb {
        self.verb
    }

    /// Append a raw option (e.g. `-p`, `-rf`, `--format=%a`).
    pub fn add_option(mut self, option: impl Into<String>) -> Self {
        self.options.push(option.into());
        self
    }

    /// Append an option whose value must be quoted (`--format '%s'`).
    pub fn add_option_value(mut self, option: &str, value: &str) -> Self {
        self.options.push(format!("{} {}", option, shell_quote(value)));
        self
    }

    fn render(mut self) -> Result<String, TemplateError> {
        let options = self
            .options
            .iter()
            .map(|o| format!("{o} "))
            .collect::<String>();
        self.data.insert("options", options);
        let rendered = render(self.verb.template(), &self.data)?;
        Ok(rendered.trim_end().to_string())
    }
}

impl CommandBuilder for ShellCommand {
    fn build(self, _options: &ExecOptions) -> Result<String, TemplateError> {
        self.render()
    }
}
