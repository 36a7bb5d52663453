use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

/// Errors that can occur while converting a document to PDF
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("Office converter {program} is not available: {reason}")]
    Unavailable { program: String, reason: String },

    #[error("Conversion of {source_name} timed out after {timeout:?}")]
    Timeout {
        source_name: String,
        timeout: Duration,
    },

    #[error("Conversion of {source_name} failed (exit code {code:?}): {stderr}")]
    Failed {
        source_name: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Failed to start converter: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Converter reported success but {0} was not written")]
    MissingOutput(Utf8PathBuf),
}

/// Converts word-processing documents to PDF
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    /// Probe the converter once before a batch starts
    async fn ensure_available(&self) -> Result<(), ConversionError>;

    /// Convert `source` into `out_dir`, returning the path of the PDF
    async fn convert(&self, source: &Utf8Path, out_dir: &Utf8Path)
    -> Result<Utf8PathBuf, ConversionError>;
}

/// LibreOffice in headless mode.
///
/// Each conversion gets its own user profile inside `out_dir`; concurrent
/// `soffice` processes sharing one profile block each other.
#[derive(Debug, Clone)]
pub struct SofficeConverter {
    program: String,
    timeout: Duration,
}

impl SofficeConverter {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Arguments for one headless conversion
    pub fn build_args(&self, source: &Utf8Path, out_dir: &Utf8Path) -> Vec<String> {
        vec![
            "--headless".to_string(),
            format!("-env:UserInstallation={}", file_url(&out_dir.join("profile"))),
            "--convert-to".to_string(),
            "pdf".to_string(),
            "--outdir".to_string(),
            out_dir.to_string(),
            source.to_string(),
        ]
    }

    /// Where the converter writes the PDF for `source`
    pub fn expected_output(source: &Utf8Path, out_dir: &Utf8Path) -> Utf8PathBuf {
        let stem = source.file_stem().unwrap_or("document");
        out_dir.join(format!("{stem}.pdf"))
    }
}

#[async_trait]
impl DocumentConverter for SofficeConverter {
    async fn ensure_available(&self) -> Result<(), ConversionError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let unavailable = |reason: String| ConversionError::Unavailable {
            program: self.program.clone(),
            reason,
        };

        let child = cmd.spawn().map_err(|e| unavailable(e.to_string()))?;
        let output = timeout(Duration::from_secs(30), child.wait_with_output())
            .await
            .map_err(|_| unavailable("no response to --version".to_string()))?
            .map_err(|e| unavailable(e.to_string()))?;

        if !output.status.success() {
            return Err(unavailable(format!(
                "--version exited with {:?}",
                output.status.code()
            )));
        }

        tracing::info!(
            "Using {}: {}",
            self.program,
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(())
    }

    async fn convert(
        &self,
        source: &Utf8Path,
        out_dir: &Utf8Path,
    ) -> Result<Utf8PathBuf, ConversionError> {
        let source_name = source.file_name().unwrap_or(source.as_str()).to_string();
        let start = Instant::now();

        let mut cmd = Command::new(&self.program);
        cmd.args(self.build_args(source, out_dir))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!("Converting {} with {}", source_name, self.program);
        let child = cmd.spawn()?;

        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                tracing::warn!("Conversion of {} timed out after {:?}", source_name, self.timeout);
                ConversionError::Timeout {
                    source_name: source_name.clone(),
                    timeout: self.timeout,
                }
            })??;

        if !output.status.success() {
            return Err(ConversionError::Failed {
                source_name,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let pdf = Self::expected_output(source, out_dir);
        if !pdf.is_file() {
            return Err(ConversionError::MissingOutput(pdf));
        }

        tracing::debug!(
            "Converted {} in {:.2}s",
            source_name,
            start.elapsed().as_secs_f32()
        );
        Ok(pdf)
    }
}

/// `file://` URL for a local path, as LibreOffice expects for bootstrap variables
fn file_url(path: &Utf8Path) -> String {
    let raw = path.as_str();
    if raw.starts_with('/') {
        format!("file://{raw}")
    } else {
        format!("file:///{}", raw.replace('\\', "/"))
    }
}
