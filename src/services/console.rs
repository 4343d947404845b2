//! Line-oriented operator surface: fills in the metadata form for the active
//! asset and triggers capture, submission and skip.

use crate::error::IngestError;
use crate::models::{ActiveAsset, Category, MetadataDraft};
use crate::services::form::FormController;
use crate::utils::validation::ValidationError;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    Name(String),
    Filename(String),
    Category(Option<String>),
    Capture,
    Submit,
    Skip,
    Status,
    Help,
    Quit,
}

const HELP: &str = "\
Commands:
  name <text>        set the item name
  filename <text>    set the filename field
  category [name]    set the category, or list the accepted ones
  capture            capture the current frame as the thumbnail
  submit             upload the asset with the current form
  skip               move on without uploading
  status             show the active asset and form
  help               show this list
  quit               stop the run";

/// Parses one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<OperatorCommand>, ValidationError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    let argument = |field: &str| {
        if rest.is_empty() {
            Err(ValidationError {
                code: "MISSING_ARGUMENT",
                message: format!("'{}' needs a value", field),
            })
        } else {
            Ok(rest.to_string())
        }
    };

    let command = match verb.to_lowercase().as_str() {
        "name" => OperatorCommand::Name(argument("name")?),
        "filename" => OperatorCommand::Filename(argument("filename")?),
        "category" => OperatorCommand::Category((!rest.is_empty()).then(|| rest.to_string())),
        "capture" => OperatorCommand::Capture,
        "submit" => OperatorCommand::Submit,
        "skip" => OperatorCommand::Skip,
        "status" => OperatorCommand::Status,
        "help" | "?" => OperatorCommand::Help,
        "quit" | "exit" => OperatorCommand::Quit,
        other => {
            return Err(ValidationError {
                code: "UNKNOWN_COMMAND",
                message: format!("unknown command '{}' (try 'help')", other),
            });
        }
    };
    Ok(Some(command))
}

pub struct OperatorConsole<R, W> {
    form: Arc<FormController>,
    active: watch::Receiver<Option<ActiveAsset>>,
    draft: MetadataDraft,
    lines: Lines<R>,
    out: W,
}

impl<R, W> OperatorConsole<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Subscribes to the form immediately so no activation is missed
    pub fn new(form: Arc<FormController>, input: R, out: W) -> Self {
        let active = form.watch_active();
        Self {
            form,
            active,
            draft: MetadataDraft::default(),
            lines: input.lines(),
            out,
        }
    }

    /// Runs until `quit`, end of input, or cancellation
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), IngestError> {
        let current = self.active.borrow_and_update().clone();
        self.on_active_changed(current).await?;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = self.active.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = self.active.borrow_and_update().clone();
                    self.on_active_changed(current).await?;
                }
                line = self.lines.next_line() => {
                    let Some(line) = line? else {
                        break;
                    };
                    match parse_command(&line) {
                        Ok(Some(OperatorCommand::Quit)) => break,
                        Ok(Some(command)) => self.execute(command).await?,
                        Ok(None) => {}
                        Err(e) => self.say(&e.to_string()).await?,
                    }
                }
            }
        }
        self.out.flush().await?;
        Ok(())
    }

    async fn on_active_changed(&mut self, asset: Option<ActiveAsset>) -> Result<(), IngestError> {
        match asset {
            Some(asset) => {
                self.draft = MetadataDraft::for_file(&asset.file);
                let line = format!(
                    "[{}/{}] {} loaded. Fill in name and category, then submit.",
                    asset.index + 1,
                    asset.total,
                    asset.file.name
                );
                self.say(&line).await
            }
            None => {
                self.draft = MetadataDraft::default();
                Ok(())
            }
        }
    }

    async fn execute(&mut self, command: OperatorCommand) -> Result<(), IngestError> {
        match command {
            OperatorCommand::Name(name) => self.draft.name = Some(name),
            OperatorCommand::Filename(filename) => self.draft.filename = Some(filename),
            OperatorCommand::Category(Some(category)) => {
                match category.parse::<Category>() {
                    Ok(c) => self.draft.category = Some(c.to_string()),
                    Err(e) => self.say(&e.to_string()).await?,
                }
            }
            OperatorCommand::Category(None) => {
                let list = Category::ALL.map(|c| c.as_str()).join(", ");
                self.say(&format!("Categories: {}", list)).await?;
            }
            OperatorCommand::Capture => {
                let reply = match self.form.render_and_capture() {
                    Ok(payload) => format!(
                        "Captured {}x{} thumbnail ({} bytes)",
                        payload.width,
                        payload.height,
                        payload.bytes.len()
                    ),
                    Err(e) => e.to_string(),
                };
                self.say(&reply).await?;
            }
            OperatorCommand::Submit => {
                let reply = match self.draft.to_metadata() {
                    Ok(metadata) => match self.form.submit(metadata).await {
                        Ok(outcome) => format!("Submission {}", outcome),
                        Err(e) => e.to_string(),
                    },
                    Err(e) => e.to_string(),
                };
                self.say(&reply).await?;
            }
            OperatorCommand::Skip => {
                let skipped = match self.form.active() {
                    Some(asset) => self.form.skip(asset.id),
                    None => Err(IngestError::NoActiveAsset),
                };
                if let Err(e) = skipped {
                    self.say(&e.to_string()).await?;
                }
            }
            OperatorCommand::Status => {
                let status = match self.form.active() {
                    Some(asset) => format!(
                        "Active: {} [{}/{}]; name={:?} filename={:?} category={:?}",
                        asset.file.name,
                        asset.index + 1,
                        asset.total,
                        self.draft.name,
                        self.draft.filename,
                        self.draft.category
                    ),
                    None => "No asset is awaiting submission".to_string(),
                };
                self.say(&status).await?;
            }
            OperatorCommand::Help => self.say(HELP).await?,
            OperatorCommand::Quit => {}
        }
        Ok(())
    }

    async fn say(&mut self, line: &str) -> Result<(), IngestError> {
        self.out.write_all(line.as_bytes()).await?;
        self.out.write_all(b"\n").await?;
        Ok(())
    }
}
