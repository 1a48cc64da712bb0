use crate::core::state::ExtractedText;
use crate::utils::fallback::{try_in_order, Strategy};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use epub::doc::EpubDoc;
use log::{debug, info};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One way of turning a source document into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    fn name(&self) -> &str;
    async fn extract(&self, path: &Path) -> Result<ExtractedText>;
}

fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn metadata(source: &str, path: &Path) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    metadata.insert("source".to_string(), source.to_string());
    metadata.insert("file".to_string(), path.to_string_lossy().to_string());
    metadata
}

/// Runs the external `pdftotext` tool.
pub struct PdftotextExtractor {
    binary: String,
}

impl PdftotextExtractor {
    pub fn new(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
        }
    }
}

#[async_trait]
impl TextExtractor for PdftotextExtractor {
    fn name(&self) -> &str {
        "pdftotext"
    }

    async fn extract(&self, path: &Path) -> Result<ExtractedText> {
        if extension(path) != "pdf" {
            bail!("{:?} is not a PDF", path);
        }
        let output = tokio::process::Command::new(&self.binary)
            .arg("-layout")
            .arg("-enc")
            .arg("UTF-8")
            .arg(path)
            .arg("-")
            .output()
            .await
            .with_context(|| format!("Failed to launch {}", self.binary))?;
        if !output.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let text = String::from_utf8_lossy(&output.stdout).to_string();
        // pdftotext separates pages with form feeds.
        let page_count = text.matches('\u{c}').count() + 1;
        Ok(ExtractedText {
            text: text.replace('\u{c}', "\n"),
            page_count,
            metadata: metadata("pdftotext", path),
        })
    }
}

/// Pure-Rust PDF text extraction, for hosts without poppler.
pub struct PdfExtractExtractor;

#[async_trait]
impl TextExtractor for PdfExtractExtractor {
    fn name(&self) -> &str {
        "pdf-extract"
    }

    async fn extract(&self, path: &Path) -> Result<ExtractedText> {
        if extension(path) != "pdf" {
            bail!("{:?} is not a PDF", path);
        }
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {:?}", path))?;
        let text = tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem(&bytes).map_err(|e| anyhow!("{:?}", e))
        })
        .await??;
        if text.trim().is_empty() {
            bail!("No text layer found in {:?}", path);
        }
        Ok(ExtractedText {
            page_count: ExtractedText::estimate_pages(&text),
            text,
            metadata: metadata("pdf-extract", path),
        })
    }
}

/// Reads the content streams page by page with lopdf.
pub struct LopdfExtractor;

impl LopdfExtractor {
    fn read(path: &Path) -> Result<ExtractedText> {
        let doc = lopdf::Document::load(path)
            .with_context(|| format!("Failed to parse PDF {:?}", path))?;
        let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
        let text = doc
            .extract_text(&pages)
            .with_context(|| format!("Failed to extract text from {:?}", path))?;
        if text.trim().is_empty() {
            bail!("No text layer found in {:?}", path);
        }
        Ok(ExtractedText {
            text,
            page_count: pages.len(),
            metadata: metadata("lopdf", path),
        })
    }
}

#[async_trait]
impl TextExtractor for LopdfExtractor {
    fn name(&self) -> &str {
        "lopdf"
    }

    async fn extract(&self, path: &Path) -> Result<ExtractedText> {
        if extension(path) != "pdf" {
            bail!("{:?} is not a PDF", path);
        }
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::read(&path)).await?
    }
}

/// Renders the XHTML documents of an EPUB spine to text.
pub struct EpubExtractor;

impl EpubExtractor {
    fn read(path: &Path) -> Result<ExtractedText> {
        let mut doc =
            EpubDoc::new(path).map_err(|e| anyhow!("Failed to open EPUB {:?}: {}", path, e))?;
        let mut chapters = Vec::new();

        loop {
            let (content, mimetype) = doc.get_current_str().unwrap_or_default();
            match mimetype.as_str() {
                "application/xhtml+xml" | "text/html" => {
                    let text = html2text::from_read(content.as_bytes(), 500)
                        .context("Failed to render EPUB chapter")?;
                    if !text.trim().is_empty() {
                        chapters.push(text);
                    }
                }
                other => debug!("Skipping EPUB resource of type {}", other),
            }
            if !doc.go_next() {
                break;
            }
        }

        if chapters.is_empty() {
            bail!("EPUB {:?} contains no text documents", path);
        }

        Ok(ExtractedText {
            page_count: chapters.len(),
            text: chapters.join("\n\n"),
            metadata: metadata("epub", path),
        })
    }
}

#[async_trait]
impl TextExtractor for EpubExtractor {
    fn name(&self) -> &str {
        "epub"
    }

    async fn extract(&self, path: &Path) -> Result<ExtractedText> {
        if extension(path) != "epub" {
            bail!("{:?} is not an EPUB", path);
        }
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::read(&path)).await?
    }
}

/// UTF-8 text files.
pub struct PlainTextExtractor;

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    fn name(&self) -> &str {
        "plain text"
    }

    async fn extract(&self, path: &Path) -> Result<ExtractedText> {
        if matches!(extension(path).as_str(), "pdf" | "epub") {
            bail!("{:?} is not a plain text file", path);
        }
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {:?}", path))?;
        let text = String::from_utf8(bytes).with_context(|| format!("{:?} is not UTF-8", path))?;
        Ok(ExtractedText {
            page_count: ExtractedText::estimate_pages(&text),
            text,
            metadata: metadata("text", path),
        })
    }
}

pub fn default_extractors(pdftotext_path: &str) -> Vec<Box<dyn TextExtractor>> {
    vec![
        Box::new(PlainTextExtractor),
        Box::new(EpubExtractor),
        Box::new(PdftotextExtractor::new(pdftotext_path)),
        Box::new(PdfExtractExtractor),
        Box::new(LopdfExtractor),
    ]
}

/// Tries each extractor in order and keeps the first result.
pub async fn extract_text(
    extractors: &[Box<dyn TextExtractor>],
    path: &Path,
) -> Result<ExtractedText> {
    let path: PathBuf = path.to_path_buf();
    let strategies: Vec<Strategy<'_, ExtractedText>> = extractors
        .iter()
        .map(|e| (e.name().to_string(), e.extract(&path)))
        .collect();
    let extracted = try_in_order(strategies)
        .await
        .with_context(|| format!("Could not extract text from {:?}", path))?;
    info!(
        "Extracted {} characters ({} pages) from {:?}",
        extracted.text.chars().count(),
        extracted.page_count,
        path
    );
    Ok(extracted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct FakeExtractor {
        name: &'static str,
        fail: bool,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl TextExtractor for FakeExtractor {
        fn name(&self) -> &str {
            self.name
        }

        async fn extract(&self, _path: &Path) -> Result<ExtractedText> {
            self.calls.lock().unwrap().push(self.name);
            if self.fail {
                bail!("{} cannot read this", self.name);
            }
            Ok(ExtractedText {
                text: format!("from {}", self.name),
                page_count: 1,
                metadata: BTreeMap::new(),
            })
        }
    }

    #[tokio::test]
    async fn test_first_successful_extractor_wins() -> Result<()> {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let extractors: Vec<Box<dyn TextExtractor>> = vec![
            Box::new(FakeExtractor { name: "a", fail: true, calls: calls.clone() }),
            Box::new(FakeExtractor { name: "b", fail: false, calls: calls.clone() }),
            Box::new(FakeExtractor { name: "c", fail: false, calls: calls.clone() }),
        ];

        let extracted = extract_text(&extractors, Path::new("chapter1.pdf")).await?;
        assert_eq!(extracted.text, "from b");
        assert_eq!(*calls.lock().unwrap(), vec!["a", "b"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_plain_text_through_default_chain() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("chapter1.txt");
        std::fs::write(&path, "a".repeat(4500))?;

        let extracted = extract_text(&default_extractors("pdftotext"), &path).await?;
        assert_eq!(extracted.page_count, 3);
        assert_eq!(extracted.metadata["source"], "text");
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_file_fails_every_strategy() {
        let result = extract_text(
            &default_extractors("pdftotext"),
            Path::new("/nonexistent/chapter1.txt"),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_plain_text_rejects_binary_formats() {
        assert!(PlainTextExtractor
            .extract(Path::new("chapter1.pdf"))
            .await
            .is_err());
        assert!(EpubExtractor.extract(Path::new("chapter1.txt")).await.is_err());
        assert!(LopdfExtractor.extract(Path::new("chapter1.txt")).await.is_err());
        assert!(PdfExtractExtractor
            .extract(Path::new("chapter1.epub"))
            .await
            .is_err());
    }

    fn write_pdf(path: &Path, line: &str) -> Result<()> {
        use lopdf::content::{Content, Operation};
        use lopdf::{dictionary, Document, Object, Stream};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![100.into(), 600.into()]),
                Operation::new("Tj", vec![Object::string_literal(line)]),
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
        doc.save(path)?;
        Ok(())
    }

    #[tokio::test]
    async fn test_lopdf_reads_text_layer() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("chapter1.pdf");
        write_pdf(&path, "Hello from the caves")?;

        let extracted = LopdfExtractor.extract(&path).await?;
        assert!(extracted.text.contains("Hello"));
        assert_eq!(extracted.page_count, 1);
        assert_eq!(extracted.metadata["source"], "lopdf");
        Ok(())
    }

    #[tokio::test]
    async fn test_pdf_without_pdftotext_falls_through_to_crate_strategies() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("chapter1.pdf");
        write_pdf(&path, "Hello from the caves")?;

        let extracted = extract_text(&default_extractors("/nonexistent/pdftotext"), &path).await?;
        assert!(extracted.text.contains("Hello"));
        assert_ne!(extracted.metadata["source"], "pdftotext");
        Ok(())
    }
}
