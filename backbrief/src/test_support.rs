//! Scripted collaborators for driving sessions in tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use anyhow::{Result, anyhow};

use crate::io::invoker::{AgentInvoker, InvokeRequest, InvokeResult};
use crate::io::operator::{Operator, check_min_len};

/// One scripted operator response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorReply {
    Text(String),
    Confirm(bool),
    /// Label of the option to pick.
    Choose(String),
}

impl OperatorReply {
    pub fn text(text: &str) -> Self {
        Self::Text(text.to_string())
    }

    pub fn confirm(yes: bool) -> Self {
        Self::Confirm(yes)
    }

    pub fn choose(label: &str) -> Self {
        Self::Choose(label.to_string())
    }
}

/// Operator that replays scripted replies in order and records what it was
/// shown. A reply of the wrong kind, or running out of replies, is an error.
#[derive(Debug, Default)]
pub struct ScriptedOperator {
    replies: VecDeque<OperatorReply>,
    prompts: Vec<String>,
    choices: Vec<Vec<String>>,
    shown: Vec<(String, String)>,
}

impl ScriptedOperator {
    pub fn new(replies: impl IntoIterator<Item = OperatorReply>) -> Self {
        Self {
            replies: replies.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Every prompt passed to ask/confirm/choose, in order.
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    /// Option labels offered by each `choose` call.
    pub fn choices_offered(&self) -> &[Vec<String>] {
        &self.choices
    }

    /// `(title, content)` of each `show` call.
    pub fn shown(&self) -> &[(String, String)] {
        &self.shown
    }

    pub fn remaining(&self) -> usize {
        self.replies.len()
    }

    fn next(&mut self, prompt: &str) -> Result<OperatorReply> {
        self.prompts.push(prompt.to_string());
        self.replies
            .pop_front()
            .ok_or_else(|| anyhow!("operator script exhausted at: {prompt}"))
    }
}

impl Operator for ScriptedOperator {
    fn ask(&mut self, prompt: &str, min_chars: usize) -> Result<String> {
        match self.next(prompt)? {
            OperatorReply::Text(text) => {
                check_min_len(&text, min_chars).map_err(|err| anyhow!(err))?;
                Ok(text.trim().to_string())
            }
            other => Err(anyhow!("expected text for '{prompt}', script has {other:?}")),
        }
    }

    fn confirm(&mut self, prompt: &str, _default: bool) -> Result<bool> {
        match self.next(prompt)? {
            OperatorReply::Confirm(yes) => Ok(yes),
            other => Err(anyhow!(
                "expected confirmation for '{prompt}', script has {other:?}"
            )),
        }
    }

    fn choose(&mut self, prompt: &str, options: &[&str]) -> Result<usize> {
        self.choices
            .push(options.iter().map(|s| (*s).to_string()).collect());
        match self.next(prompt)? {
            OperatorReply::Choose(label) => options
                .iter()
                .position(|option| *option == label)
                .ok_or_else(|| anyhow!("'{label}' not offered for '{prompt}': {options:?}")),
            other => Err(anyhow!("expected choice for '{prompt}', script has {other:?}")),
        }
    }

    fn show(&mut self, title: &str, content: &str, _source: Option<&Path>) -> Result<()> {
        self.shown.push((title.to_string(), content.to_string()));
        Ok(())
    }
}

/// One scripted agent run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentReply {
    /// Written to the designated output path.
    pub file: Option<String>,
    pub stdout: String,
    pub exit_code: i32,
    /// Extra files written next to the designated output, by file name.
    pub side_files: Vec<(String, String)>,
}

impl AgentReply {
    pub fn writes(text: &str) -> Self {
        Self {
            file: Some(text.to_string()),
            ..Self::default()
        }
    }

    pub fn prints(text: &str) -> Self {
        Self {
            stdout: text.to_string(),
            ..Self::default()
        }
    }

    /// Agent that produces nothing.
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn exit(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    pub fn side_file(mut self, name: &str, contents: &str) -> Self {
        self.side_files.push((name.to_string(), contents.to_string()));
        self
    }
}

/// Invoker that replays scripted runs in order and records each request.
#[derive(Debug, Default)]
pub struct ScriptedInvoker {
    replies: RefCell<VecDeque<AgentReply>>,
    requests: RefCell<Vec<InvokeRequest>>,
}

impl ScriptedInvoker {
    pub fn new(replies: impl IntoIterator<Item = AgentReply>) -> Self {
        Self {
            replies: RefCell::new(replies.into_iter().collect()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<InvokeRequest> {
        self.requests.borrow().clone()
    }

    /// Labels of every invocation, in order.
    pub fn labels(&self) -> Vec<String> {
        self.requests
            .borrow()
            .iter()
            .map(|r| r.label.clone())
            .collect()
    }

    pub fn remaining(&self) -> usize {
        self.replies.borrow().len()
    }
}

impl AgentInvoker for ScriptedInvoker {
    fn invoke(&self, request: &InvokeRequest) -> Result<InvokeResult> {
        self.requests.borrow_mut().push(request.clone());
        let reply = self
            .replies
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("agent script exhausted at {}", request.label))?;

        if let Some(parent) = request.output_path.parent() {
            fs::create_dir_all(parent)?;
            for (name, contents) in &reply.side_files {
                fs::write(parent.join(name), contents)?;
            }
        }
        if let Some(text) = &reply.file {
            fs::write(&request.output_path, text)?;
        }
        Ok(InvokeResult {
            exit_code: Some(reply.exit_code),
            success: reply.exit_code == 0,
            stdout: reply.stdout,
        })
    }
}
