//! Concrete converters behind the [`Converter`] trait.
//!
//! - [`OfficeConverter`] drives a headless LibreOffice (`soffice`) for both
//!   word-processor documents and spreadsheets.
//! - [`PlaceholderConverter`] writes a one-page PDF naming the source file,
//!   for dry runs on machines without an office suite.

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

use crate::contract::{BoxError, Converter};
use crate::registry::{canonical_name, ConversionKind};

/// Which converter the binary wires in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConverterBackend {
    Office,
    Placeholder,
}

impl std::str::FromStr for ConverterBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "office" | "soffice" | "libreoffice" => Ok(ConverterBackend::Office),
            "placeholder" | "dummy" => Ok(ConverterBackend::Placeholder),
            other => Err(format!("unknown converter {other:?}, expected office or placeholder")),
        }
    }
}

pub struct OfficeConverter {
    soffice: PathBuf,
}

impl OfficeConverter {
    pub fn new(soffice: impl Into<PathBuf>) -> Self {
        Self {
            soffice: soffice.into(),
        }
    }
}

fn export_filter(kind: ConversionKind) -> &'static str {
    match kind {
        ConversionKind::WordDocument => "pdf:writer_pdf_Export",
        ConversionKind::Spreadsheet => "pdf:calc_pdf_Export",
    }
}

#[async_trait]
impl Converter for OfficeConverter {
    async fn convert(
        &self,
        kind: ConversionKind,
        input: &Path,
        output: &Path,
    ) -> Result<(), BoxError> {
        let file_name = input
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| format!("not a file path: {}", input.display()))?;

        // Private out-dir and profile: parallel soffice runs sharing a profile refuse to start.
        let workdir = tempfile::tempdir()?;
        let profile = workdir.path().join("profile");

        debug!(soffice = %self.soffice.display(), input = %input.display(), %kind, "Invoking soffice");
        let result = Command::new(&self.soffice)
            .arg(format!("-env:UserInstallation=file://{}", profile.display()))
            .args(["--headless", "--norestore", "--convert-to", export_filter(kind), "--outdir"])
            .arg(workdir.path())
            .arg(input)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| format!("failed to start {}: {e}", self.soffice.display()))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(format!("soffice exited with {}: {}", result.status, stderr.trim()).into());
        }

        let produced = workdir.path().join(canonical_name(file_name));
        if !produced.is_file() {
            return Err(format!("soffice reported success but wrote no {}", produced.display()).into());
        }
        tokio::fs::copy(&produced, output).await?;
        info!(input = %input.display(), output = %output.display(), "soffice conversion done");
        Ok(())
    }
}

pub struct PlaceholderConverter;

#[async_trait]
impl Converter for PlaceholderConverter {
    async fn convert(
        &self,
        kind: ConversionKind,
        input: &Path,
        output: &Path,
    ) -> Result<(), BoxError> {
        let label = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| input.display().to_string());
        write_placeholder_pdf(&format!("{label} ({kind})"), output)?;
        Ok(())
    }
}

/// Writes a single A4 page showing `label`.
pub fn write_placeholder_pdf(label: &str, output: &Path) -> Result<(), BoxError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 18.into()]),
            Operation::new("Td", vec![72.into(), 760.into()]),
            Operation::new("Tj", vec![Object::string_literal(label)]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(output)?;
    Ok(())
}
