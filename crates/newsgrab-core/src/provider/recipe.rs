//! Recipe provider: runs an external recipe runner and reads its articles
//! from stdout as JSON Lines.

use std::process::Stdio;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;

use super::{CandidateProvider, CandidateStream, FetchWindow, ProviderKind, ProviderResult};
use crate::article::ArticleCandidate;
use crate::config::RecipeConfig;
use crate::error::ProviderError;
use crate::source::Source;

const STDERR_TAIL_CHARS: usize = 500;

/// One article line emitted by the recipe runner
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecipeArticle {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub guid: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub feed_title: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    /// RFC 3339 timestamp
    #[serde(default)]
    pub published: Option<String>,
}

impl RecipeArticle {
    pub fn into_candidate(self, source_id: &str) -> ArticleCandidate {
        let published_at = self.published.as_deref().and_then(|raw| {
            DateTime::parse_from_rfc3339(raw.trim())
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| tracing::debug!("Ignoring unparsable publish date '{}': {}", raw, e))
                .ok()
        });

        ArticleCandidate {
            source_id: source_id.to_string(),
            title: self.title,
            url: self.url,
            guid: self.guid,
            author: self.author,
            feed_title: self.feed_title,
            summary: self.summary,
            content: self.content,
            published_at,
        }
    }
}

/// Parse a single JSON line from the runner
pub(crate) fn parse_line(line: &str, source_id: &str) -> ProviderResult<Option<ArticleCandidate>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let article: RecipeArticle = serde_json::from_str(line)
        .map_err(|e| ProviderError::parse_failure(format!("bad recipe output line: {}", e)))?;
    Ok(Some(article.into_candidate(source_id)))
}

pub struct RecipeProvider {
    command: Option<String>,
    args: Vec<String>,
    auth_exit_code: i32,
}

impl RecipeProvider {
    pub fn new(config: &RecipeConfig) -> Self {
        Self {
            command: config
                .command
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
            args: config.args.clone(),
            auth_exit_code: config.auth_exit_code,
        }
    }

    fn build_command(&self, program: &str, source: &Source, window: &FetchWindow) -> Command {
        let mut cmd = Command::new(program);
        cmd.args(&self.args)
            .arg("--recipe")
            .arg(&source.locator)
            .arg("--oldest-days")
            .arg(window.oldest_days.to_string())
            .arg("--max-articles")
            .arg(window.max_articles.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

/// Running recipe process whose stdout is consumed line by line
struct RecipeRun {
    source_id: String,
    program: String,
    auth_exit_code: i32,
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    stderr: Option<JoinHandle<String>>,
    finished: bool,
}

impl RecipeRun {
    async fn next_candidate(mut self) -> Option<(ProviderResult<ArticleCandidate>, Self)> {
        if self.finished {
            return None;
        }
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) => match parse_line(&line, &self.source_id) {
                    Ok(Some(candidate)) => return Some((Ok(candidate), self)),
                    Ok(None) => continue,
                    Err(e) => {
                        self.finished = true;
                        let _ = self.child.start_kill();
                        return Some((Err(e), self));
                    }
                },
                Ok(None) => {
                    self.finished = true;
                    return match self.exit_error().await {
                        Some(e) => Some((Err(e), self)),
                        None => None,
                    };
                }
                Err(e) => {
                    self.finished = true;
                    let _ = self.child.start_kill();
                    return Some((
                        Err(ProviderError::unavailable(format!(
                            "failed to read output of {}: {}",
                            self.program, e
                        ))),
                        self,
                    ));
                }
            }
        }
    }

    /// Wait for the runner and map a non-zero exit to a provider error
    async fn exit_error(&mut self) -> Option<ProviderError> {
        let status = match self.child.wait().await {
            Ok(status) => status,
            Err(e) => {
                return Some(ProviderError::unavailable(format!(
                    "failed to wait for {}: {}",
                    self.program, e
                )))
            }
        };
        if status.success() {
            return None;
        }

        let stderr = match self.stderr.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };
        let detail = stderr_tail(&stderr);

        if status.code() == Some(self.auth_exit_code) {
            Some(ProviderError::auth_required(format!(
                "recipe for '{}' needs credentials: {}",
                self.source_id, detail
            )))
        } else {
            Some(ProviderError::unavailable(format!(
                "{} exited with {}: {}",
                self.program, status, detail
            )))
        }
    }
}

fn stderr_tail(stderr: &str) -> String {
    let trimmed = stderr.trim();
    let count = trimmed.chars().count();
    if count <= STDERR_TAIL_CHARS {
        return trimmed.to_string();
    }
    trimmed.chars().skip(count - STDERR_TAIL_CHARS).collect()
}

#[async_trait::async_trait]
impl CandidateProvider for RecipeProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Recipe
    }

    async fn fetch_candidates(
        &self,
        source: &Source,
        window: &FetchWindow,
    ) -> ProviderResult<CandidateStream> {
        let program = self
            .command
            .as_deref()
            .ok_or_else(|| ProviderError::unavailable("no recipe command configured"))?;

        tracing::debug!("Running recipe '{}' for '{}'", source.locator, source.id);

        let mut child = self
            .build_command(program, source, window)
            .spawn()
            .map_err(|e| ProviderError::unavailable(format!("failed to spawn {}: {}", program, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProviderError::unavailable("recipe runner stdout not captured"))?;

        // Drain stderr concurrently so a chatty runner never blocks on a full pipe
        let stderr = child.stderr.take().map(|mut pipe| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = pipe.read_to_string(&mut buf).await;
                buf
            })
        });

        let run = RecipeRun {
            source_id: source.id.clone(),
            program: program.to_string(),
            auth_exit_code: self.auth_exit_code,
            child,
            lines: BufReader::new(stdout).lines(),
            stderr,
            finished: false,
        };

        Ok(stream::unfold(run, RecipeRun::next_candidate).boxed())
    }
}
