//! Garden classifier backed by an external vision command.
//!
//! The image is written to a scratch file, the rendered prompt is piped on
//! stdin, and stdout must be a JSON object matching
//! `schemas/classification.schema.json`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::{Draft, Validator};
use minijinja::{Environment, context};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

use crate::core::types::Classification;
use crate::io::capabilities::{CapabilityError, CapabilityResult, GardenClassifier};
use crate::io::config::ClassifierConfig;
use crate::io::process::{ChildExit, run_with_timeout};

const CLASSIFY_TEMPLATE: &str = include_str!("prompts/classify.md");
const CLASSIFICATION_SCHEMA: &str = include_str!("../../schemas/classification.schema.json");
/// Scratch images are `classify-<random>.jpg`, removed after each call.
const SCRATCH_PREFIX: &str = "classify-";
const SCRATCH_SUFFIX: &str = ".jpg";
/// Argument placeholder replaced with the scratch image path.
const IMAGE_PLACEHOLDER: &str = "{image}";

pub struct CommandClassifier {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
    scratch_dir: PathBuf,
    env: Environment<'static>,
    validator: Validator,
}

impl std::fmt::Debug for CommandClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandClassifier")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("timeout", &self.timeout)
            .field("scratch_dir", &self.scratch_dir)
            .finish_non_exhaustive()
    }
}

impl CommandClassifier {
    /// Build a classifier from config. Fails if no command is configured.
    pub fn new(config: &ClassifierConfig, scratch_dir: impl Into<PathBuf>) -> Result<Self> {
        let (program, args) = config
            .command
            .split_first()
            .ok_or_else(|| anyhow!("classifier.command is empty; configure a vision command"))?;

        let mut env = Environment::new();
        env.add_template("classify", CLASSIFY_TEMPLATE)
            .context("load classify prompt template")?;

        let schema: Value =
            serde_json::from_str(CLASSIFICATION_SCHEMA).context("parse classification schema")?;
        let validator = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(&schema)
            .context("compile classification schema")?;

        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
            scratch_dir: scratch_dir.into(),
            env,
            validator,
        })
    }

    fn render_prompt(&self, address_label: &str, image_path: &Path) -> Result<String> {
        let template = self.env.get_template("classify")?;
        let rendered = template.render(context! {
            address => address_label,
            image_path => image_path.display().to_string(),
        })?;
        Ok(rendered)
    }

    /// Write `image` to a uniquely named file in the scratch dir, deleted when
    /// the returned handle drops. Runs sharing a `data_dir` never share a file.
    fn write_scratch_image(&self, image: &[u8]) -> Result<NamedTempFile> {
        fs::create_dir_all(&self.scratch_dir)
            .with_context(|| format!("create directory {}", self.scratch_dir.display()))?;
        let mut file = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .suffix(SCRATCH_SUFFIX)
            .tempfile_in(&self.scratch_dir)
            .with_context(|| format!("create scratch image in {}", self.scratch_dir.display()))?;
        file.write_all(image)
            .and_then(|()| file.flush())
            .with_context(|| format!("write {}", file.path().display()))?;
        Ok(file)
    }

    fn command(&self, image_path: &Path) -> Command {
        let image = image_path.display().to_string();
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args.iter().map(|arg| arg.replace(IMAGE_PLACEHOLDER, &image)));
        cmd
    }

    fn parse_output(&self, stdout: &[u8]) -> Result<Classification> {
        let text = String::from_utf8_lossy(stdout);
        let mut value = extract_json_object(&text)?;
        if let Some(likelihood) = value.get_mut("likelihood") {
            if let Some(raw) = likelihood.as_str() {
                *likelihood = Value::String(raw.trim().to_ascii_lowercase());
            }
        }
        let messages: Vec<String> = self
            .validator
            .iter_errors(&value)
            .map(|err| err.to_string())
            .collect();
        if !messages.is_empty() {
            bail!("classifier output failed validation: {}", messages.join("; "));
        }
        serde_json::from_value(value).context("decode classifier output")
    }
}

impl GardenClassifier for CommandClassifier {
    #[instrument(skip_all, fields(address = address_label))]
    fn classify(&self, image: &[u8], address_label: &str) -> CapabilityResult<Classification> {
        let scratch = self
            .write_scratch_image(image)
            .map_err(|err| CapabilityError::terminal(format!("{err:#}")))?;
        let image_path = scratch.path();
        let prompt = self
            .render_prompt(address_label, image_path)
            .map_err(|err| CapabilityError::terminal(format!("render prompt: {err:#}")))?;

        let output = run_with_timeout(
            self.command(image_path),
            Some(prompt.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .map_err(|err| CapabilityError::terminal(format!("{}: {err:#}", self.program)))?;

        match output.exit {
            ChildExit::TimedOut => {
                return Err(CapabilityError::transient(format!(
                    "classifier timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
            ChildExit::Exited(status) if !status.success() => {
                return Err(CapabilityError::transient(format!(
                    "classifier exited with {:?}: {}",
                    status.code(),
                    output.stderr_tail()
                )));
            }
            ChildExit::Exited(_) => {}
        }

        let classification = self
            .parse_output(&output.stdout.bytes)
            .map_err(|err| CapabilityError::terminal(format!("{err:#}")))?;
        debug!(likelihood = classification.likelihood.as_str(), "classified");
        Ok(classification)
    }
}

/// Parse stdout as JSON, tolerating prose around a single object.
fn extract_json_object(text: &str) -> Result<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }
    let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) else {
        bail!("classifier output contains no JSON object");
    };
    if end < start {
        bail!("classifier output contains no JSON object");
    }
    serde_json::from_str(&trimmed[start..=end]).context("parse classifier output")
}
