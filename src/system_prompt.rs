//! System prompt construction with template rendering and AGENTS.md discovery
//!
//! A configured template file is rendered with the session's context
//! variables; guidance files (AGENTS.md, AGENT.md) discovered from the
//! working directory up to the filesystem root are appended. Any problem with
//! the template falls back to the built-in prompt.

use std::fmt::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Names of guidance files to look for, in order of preference
const GUIDANCE_FILE_NAMES: &[&str] = &["AGENTS.md", "AGENT.md"];

/// Built-in prompt establishing the agent's role
const BUILTIN_PROMPT: &str = r"You are a helpful AI assistant working in an interactive terminal session. You have access to tools for running shell commands, reading images and recording your reasoning. Use tools when appropriate to accomplish tasks.

Be concise in your responses. When using tools, explain what you're doing briefly.

Working directory: {{working_dir}}
Model: {{model}}
Date: {{date}}
Available tools: {{tools}}";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Failed to read prompt template {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Prompt template {path} is empty")]
    Empty { path: PathBuf },
}

/// Values substituted into the prompt template
#[derive(Debug, Clone)]
pub struct PromptVars {
    pub working_dir: PathBuf,
    pub model: String,
    pub date: String,
    pub tools: Vec<String>,
}

impl PromptVars {
    /// Variables dated today
    pub fn new(working_dir: PathBuf, model: impl Into<String>, tools: Vec<String>) -> Self {
        Self {
            working_dir,
            model: model.into(),
            date: chrono::Local::now().format("%Y-%m-%d").to_string(),
            tools,
        }
    }
}

/// A discovered guidance file with its path and content
#[derive(Debug, Clone)]
pub struct GuidanceFile {
    pub path: PathBuf,
    pub content: String,
}

#[derive(Debug, Clone, Default)]
pub struct PromptService {
    template_path: Option<PathBuf>,
}

impl PromptService {
    pub fn new(template_path: Option<PathBuf>) -> Self {
        Self { template_path }
    }

    /// Build the system prompt for the next turn. Never fails.
    pub fn system_prompt(&self, vars: &PromptVars) -> String {
        let template = self.load_template().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Falling back to built-in system prompt");
            BUILTIN_PROMPT.to_string()
        });

        let mut prompt = render(&template, vars);
        append_guidance(&mut prompt, &discover_guidance_files(&vars.working_dir));
        prompt
    }

    fn load_template(&self) -> Result<String, PromptError> {
        let Some(path) = &self.template_path else {
            return Ok(BUILTIN_PROMPT.to_string());
        };

        let template = std::fs::read_to_string(path).map_err(|source| PromptError::Read {
            path: path.clone(),
            source,
        })?;
        if template.trim().is_empty() {
            return Err(PromptError::Empty { path: path.clone() });
        }
        Ok(template)
    }
}

/// Substitute `{{name}}` placeholders. Unknown placeholders are left as is.
pub fn render(template: &str, vars: &PromptVars) -> String {
    let tools = if vars.tools.is_empty() {
        "none".to_string()
    } else {
        vars.tools.join(", ")
    };

    template
        .replace("{{working_dir}}", &vars.working_dir.display().to_string())
        .replace("{{model}}", &vars.model)
        .replace("{{date}}", &vars.date)
        .replace("{{tools}}", &tools)
}

/// Discover guidance files from the working directory up to the root.
/// Returns files in order from root to cwd (more specific files last).
pub fn discover_guidance_files(working_dir: &Path) -> Vec<GuidanceFile> {
    let mut files = Vec::new();

    for dir in working_dir.ancestors() {
        // One guidance file per directory, first match wins
        let found = GUIDANCE_FILE_NAMES.iter().find_map(|name| {
            let path = dir.join(name);
            if !path.is_file() {
                return None;
            }
            match std::fs::read_to_string(&path) {
                Ok(content) => Some(GuidanceFile { path, content }),
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "Skipping unreadable guidance file");
                    None
                }
            }
        });
        files.extend(found);
    }

    files.reverse();
    files
}

fn append_guidance(prompt: &mut String, files: &[GuidanceFile]) {
    if files.is_empty() {
        return;
    }

    prompt.push_str("\n\n<project_guidance>\n");
    for (i, file) in files.iter().enumerate() {
        if i > 0 {
            prompt.push_str("\n---\n\n");
        }
        let _ = writeln!(prompt, "<!-- From: {} -->", file.path.display());
        prompt.push_str(&file.content);
        if !file.content.ends_with('\n') {
            prompt.push('\n');
        }
    }
    prompt.push_str("</project_guidance>");
}
