//! Source loading: URLs, plain-text files, and directories of PDFs.
//!
//! Every input string is resolved exactly once into a [`SourceKind`] and then
//! handled exhaustively. Preconditions are checked before any I/O; the first
//! failure aborts a batch and no partial result is returned.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::document::{Document, meta};
use crate::error::{BoxError, RagentError, Result};

/// Fetches a web page and turns it into one or more documents.
#[async_trait]
pub trait WebFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> std::result::Result<Vec<Document>, BoxError>;
}

/// Extracts per-page text from a single PDF file.
///
/// Extraction is CPU-bound, so the loader runs it on the blocking pool.
pub trait PdfExtractor: Send + Sync {
    fn extract_pages(&self, path: &Path) -> std::result::Result<Vec<String>, BoxError>;
}

/// What a source string refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    Url(String),
    TextFile(PathBuf),
    PdfDirectory(PathBuf),
    Unsupported { path: PathBuf, suffix: String },
}

impl SourceKind {
    /// Classify a non-empty source string. Paths must exist.
    ///
    /// The URL scheme is matched case-sensitively; the file suffix is not.
    pub async fn resolve(source: &str) -> Result<Self> {
        if source.starts_with("http://") || source.starts_with("https://") {
            return Ok(SourceKind::Url(source.to_string()));
        }

        let path = PathBuf::from(source);
        let metadata = tokio::fs::metadata(&path).await.map_err(|_| {
            RagentError::invalid_input(format!("Source path does not exist: {}", source))
        })?;

        if metadata.is_dir() {
            return Ok(SourceKind::PdfDirectory(path));
        }

        let suffix = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        if suffix == ".txt" {
            Ok(SourceKind::TextFile(path))
        } else {
            Ok(SourceKind::Unsupported { path, suffix })
        }
    }
}

/// Loads raw sources into [`Document`]s.
#[derive(Clone)]
pub struct SourceLoader {
    fetcher: Arc<dyn WebFetcher>,
    pdf: Arc<dyn PdfExtractor>,
}

impl Default for SourceLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceLoader {
    pub fn new() -> Self {
        Self {
            fetcher: Arc::new(HttpFetcher::default()),
            pdf: Arc::new(PdfTextExtractor),
        }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn WebFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_pdf_extractor(mut self, pdf: Arc<dyn PdfExtractor>) -> Self {
        self.pdf = pdf;
        self
    }

    /// Load a web page.
    pub async fn load_from_url(&self, url: &str) -> Result<Vec<Document>> {
        let url = url.trim();
        if url.is_empty() {
            return Err(RagentError::invalid_input(
                "Parameter 'url' must be a non-empty string.",
            ));
        }
        let parsed = Url::parse(url)
            .map_err(|e| RagentError::invalid_input(format!("Invalid URL '{}': {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(RagentError::invalid_input(format!(
                "Unsupported URL scheme '{}'. Only 'http' and 'https' are allowed.",
                parsed.scheme()
            )));
        }

        debug!(url = %parsed, "Fetching URL");
        let docs = self
            .fetcher
            .fetch(&parsed)
            .await
            .map_err(|e| RagentError::load_failure(url, e))?;
        info!(url = %parsed, documents = docs.len(), "Loaded URL");
        Ok(docs)
    }

    /// Load every PDF under `directory`, one document per page.
    pub async fn load_from_pdf_dir(&self, directory: impl AsRef<Path>) -> Result<Vec<Document>> {
        let directory = directory.as_ref();
        if directory.as_os_str().is_empty() {
            return Err(RagentError::invalid_input(
                "Parameter 'directory' must be a non-empty path.",
            ));
        }
        let metadata = tokio::fs::metadata(directory).await.map_err(|_| {
            RagentError::invalid_input(format!(
                "Directory does not exist: {}",
                directory.display()
            ))
        })?;
        if !metadata.is_dir() {
            return Err(RagentError::invalid_input(format!(
                "Provided path is not a directory: {}",
                directory.display()
            )));
        }

        let files = find_pdfs(directory);
        if files.is_empty() {
            warn!(directory = %directory.display(), "No PDF files found");
        }

        let mut docs = Vec::new();
        for file in files {
            let extractor = Arc::clone(&self.pdf);
            let path = file.clone();
            let pages = tokio::task::spawn_blocking(move || extractor.extract_pages(&path))
                .await
                .map_err(|e| RagentError::load_failure(file.display().to_string(), e))?
                .map_err(|e| RagentError::load_failure(file.display().to_string(), e))?;

            let total = pages.len();
            let source = file.display().to_string();
            for (page, text) in pages.into_iter().enumerate() {
                docs.push(
                    Document::new(text)
                        .with_metadata(meta::SOURCE, source.clone())
                        .with_metadata(meta::PAGE, page)
                        .with_metadata(meta::TOTAL_PAGES, total),
                );
            }
            debug!(file = %source, pages = total, "Extracted PDF");
        }

        info!(
            directory = %directory.display(),
            documents = docs.len(),
            "Loaded PDF directory"
        );
        Ok(docs)
    }

    /// Load a single `.txt` file.
    pub async fn load_from_txt(&self, file_path: impl AsRef<Path>) -> Result<Vec<Document>> {
        let path = file_path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(RagentError::invalid_input(
                "Parameter 'file_path' must be a non-empty path.",
            ));
        }
        let metadata = tokio::fs::metadata(path).await.map_err(|_| {
            RagentError::invalid_input(format!("File does not exist: {}", path.display()))
        })?;
        if !metadata.is_file() {
            return Err(RagentError::invalid_input(format!(
                "Provided path is not a file: {}",
                path.display()
            )));
        }
        if !has_extension(path, "txt") {
            return Err(RagentError::invalid_input(format!(
                "Unsupported file type for load_from_txt: {} (expected '.txt')",
                path.display()
            )));
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| RagentError::load_failure(path.display().to_string(), e))?;
        debug!(file = %path.display(), chars = content.len(), "Loaded text file");
        Ok(vec![
            Document::new(content).with_metadata(meta::SOURCE, path.display().to_string()),
        ])
    }

    /// Load a heterogeneous batch of sources, concatenated in input order.
    pub async fn load_documents<S: AsRef<str>>(&self, sources: &[S]) -> Result<Vec<Document>> {
        if sources.is_empty() {
            return Err(RagentError::invalid_input(
                "Parameter 'sources' must be a non-empty sequence.",
            ));
        }

        let mut all = Vec::new();
        for source in sources {
            let source = source.as_ref().trim();
            if source.is_empty() {
                continue;
            }
            let docs = match SourceKind::resolve(source).await? {
                SourceKind::Url(url) => self.load_from_url(&url).await?,
                SourceKind::PdfDirectory(dir) => self.load_from_pdf_dir(&dir).await?,
                SourceKind::TextFile(path) => self.load_from_txt(&path).await?,
                SourceKind::Unsupported { path, suffix } => {
                    return Err(RagentError::invalid_input(format!(
                        "Unsupported file type: {} (source: {})",
                        if suffix.is_empty() { "<none>" } else { &suffix },
                        path.display()
                    )));
                }
            };
            all.extend(docs);
        }

        info!(
            sources = sources.len(),
            documents = all.len(),
            "Loaded documents"
        );
        Ok(all)
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

/// PDFs below `dir`, sorted, skipping hidden entries.
fn find_pdfs(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        .flatten()
        .filter(|e| e.file_type().is_file() && has_extension(e.path(), "pdf"))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// [`PdfExtractor`] backed by `pdf-extract`, splitting pages on form feeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTextExtractor;

impl PdfExtractor for PdfTextExtractor {
    fn extract_pages(&self, path: &Path) -> std::result::Result<Vec<String>, BoxError> {
        let text = pdf_extract::extract_text(path)
            .map_err(|e| -> BoxError { format!("PDF text extraction failed: {}", e).into() })?;
        let mut pages: Vec<String> = text.split('\x0c').map(str::to_string).collect();
        if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
            pages.pop();
        }
        Ok(pages)
    }
}

/// [`WebFetcher`] over `reqwest` that strips HTML down to readable text.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    timeout: Duration,
    user_agent: String,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            user_agent: format!("Ragent/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpFetcher {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl WebFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> std::result::Result<Vec<Document>, BoxError> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(&self.user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        let response = client.get(url.clone()).send().await?.error_for_status()?;

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response.text().await?;

        let is_html =
            content_type.contains("text/html") || content_type.contains("application/xhtml");
        let (text, title) = if is_html {
            (extract_text_from_html(&body), extract_title(&body))
        } else {
            (body, None)
        };

        let mut doc = Document::new(text).with_metadata(meta::SOURCE, url.to_string());
        if let Some(title) = title {
            doc = doc.with_metadata(meta::TITLE, title);
        }
        if !content_type.is_empty() {
            doc = doc.with_metadata(meta::CONTENT_TYPE, content_type);
        }
        Ok(vec![doc])
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Contents of the first `<title>` element, if any.
fn extract_title(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let open = lower.find("<title")?;
    let start = open + lower[open..].find('>')? + 1;
    let end = start + lower[start..].find("</title")?;
    let title = decode_entities(html[start..end].trim());
    if title.is_empty() { None } else { Some(title) }
}

/// Strips tags and extracts readable content, with block elements on their
/// own lines. Script and style bodies are dropped.
pub fn extract_text_from_html(html: &str) -> String {
    let mut text = String::new();
    let mut in_tag = false;
    let mut in_script = false;
    let mut in_style = false;
    let mut tag_name = String::new();
    let mut building_tag = false;

    for ch in html.chars() {
        if ch == '<' {
            in_tag = true;
            building_tag = true;
            tag_name.clear();
            continue;
        }
        if ch == '>' {
            in_tag = false;
            building_tag = false;

            let tag = tag_name.to_lowercase();
            match tag.as_str() {
                "script" => in_script = true,
                "/script" => in_script = false,
                "style" => in_style = true,
                "/style" => in_style = false,
                _ => {}
            }

            let bare = tag.trim_start_matches('/');
            let is_block = matches!(
                bare,
                "p" | "br" | "div" | "li" | "tr" | "section" | "article" | "title"
            ) || (bare.len() == 2
                && bare.starts_with('h')
                && bare[1..].chars().all(|c| c.is_ascii_digit()));
            if is_block {
                text.push('\n');
            }
            continue;
        }
        if in_tag {
            if building_tag && (ch.is_alphanumeric() || ch == '/') {
                tag_name.push(ch);
            } else {
                building_tag = false;
            }
            continue;
        }
        if in_script || in_style {
            continue;
        }
        text.push(ch);
    }

    let text = decode_entities(&text);

    let mut lines: Vec<&str> = text.lines().map(|l| l.trim()).collect();
    lines.dedup_by(|a, b| a.is_empty() && b.is_empty());
    lines
        .into_iter()
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct StaticFetcher {
        docs: Vec<Document>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl WebFetcher for StaticFetcher {
        async fn fetch(&self, url: &Url) -> std::result::Result<Vec<Document>, BoxError> {
            self.calls.lock().unwrap().push(url.to_string());
            Ok(self.docs.clone())
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl WebFetcher for FailingFetcher {
        async fn fetch(&self, _url: &Url) -> std::result::Result<Vec<Document>, BoxError> {
            Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )))
        }
    }

    struct FakePdf;

    impl PdfExtractor for FakePdf {
        fn extract_pages(&self, path: &Path) -> std::result::Result<Vec<String>, BoxError> {
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            Ok(vec![format!("{name} page one"), format!("{name} page two")])
        }
    }

    struct BrokenPdf;

    impl PdfExtractor for BrokenPdf {
        fn extract_pages(&self, _path: &Path) -> std::result::Result<Vec<String>, BoxError> {
            Err("corrupt xref table".into())
        }
    }

    fn static_loader(docs: Vec<Document>) -> (SourceLoader, Arc<StaticFetcher>) {
        let fetcher = Arc::new(StaticFetcher {
            docs,
            calls: Mutex::new(Vec::new()),
        });
        let loader = SourceLoader::new()
            .with_fetcher(fetcher.clone())
            .with_pdf_extractor(Arc::new(FakePdf));
        (loader, fetcher)
    }

    #[tokio::test]
    async fn test_url_validation_happens_before_fetch() {
        let (loader, fetcher) = static_loader(vec![Document::new("x")]);

        let err = loader.load_from_url("").await.unwrap_err();
        assert!(matches!(err, RagentError::InvalidInput { .. }));

        let err = loader.load_from_url("ftp://example.com/a").await.unwrap_err();
        assert!(err.to_string().contains("Unsupported URL scheme 'ftp'"));

        let err = loader.load_from_url("not a url").await.unwrap_err();
        assert!(matches!(err, RagentError::InvalidInput { .. }));

        assert!(fetcher.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_url_fetch_failure_wraps_cause() {
        let loader = SourceLoader::new().with_fetcher(Arc::new(FailingFetcher));
        let err = loader
            .load_from_url("https://example.invalid/page")
            .await
            .unwrap_err();
        match &err {
            RagentError::LoadFailure { target, cause } => {
                assert_eq!(target, "https://example.invalid/page");
                assert_eq!(cause.to_string(), "connection refused");
            }
            other => panic!("expected LoadFailure, got {other:?}"),
        }
        assert!(err.to_string().contains("https://example.invalid/page"));
    }

    #[tokio::test]
    async fn test_load_from_txt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "The capital of France is Paris.").unwrap();

        let loader = SourceLoader::new();
        let docs = loader.load_from_txt(&path).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "The capital of France is Paris.");
        assert_eq!(docs[0].source(), Some(path.display().to_string().as_str()));
    }

    #[tokio::test]
    async fn test_load_from_txt_rejects_other_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readme.md");
        std::fs::write(&path, "# readme").unwrap();

        let err = SourceLoader::new().load_from_txt(&path).await.unwrap_err();
        assert!(matches!(err, RagentError::InvalidInput { .. }));
        assert!(err.to_string().contains("expected '.txt'"));
    }

    #[tokio::test]
    async fn test_load_from_txt_accepts_uppercase_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("NOTES.TXT");
        std::fs::write(&path, "upper").unwrap();
        let docs = SourceLoader::new().load_from_txt(&path).await.unwrap();
        assert_eq!(docs[0].content, "upper");
    }

    #[tokio::test]
    async fn test_load_from_txt_missing_and_directory() {
        let dir = tempfile::tempdir().unwrap();
        let loader = SourceLoader::new();

        let err = loader
            .load_from_txt(dir.path().join("missing.txt"))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("File does not exist"));

        let err = loader.load_from_txt(dir.path()).await.unwrap_err();
        assert!(err.to_string().starts_with("Provided path is not a file"));
    }

    #[tokio::test]
    async fn test_load_from_pdf_dir_pages_in_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.pdf"), b"%PDF").unwrap();
        std::fs::write(dir.path().join("a.PDF"), b"%PDF").unwrap();
        std::fs::write(dir.path().join(".hidden.pdf"), b"%PDF").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"skip").unwrap();

        let (loader, _) = static_loader(Vec::new());
        let docs = loader.load_from_pdf_dir(dir.path()).await.unwrap();

        let contents: Vec<&str> = docs.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(
            contents,
            vec![
                "a.PDF page one",
                "a.PDF page two",
                "b.pdf page one",
                "b.pdf page two"
            ]
        );
        assert_eq!(docs[1].metadata.get(meta::PAGE), Some(&serde_json::json!(1)));
        assert_eq!(
            docs[1].metadata.get(meta::TOTAL_PAGES),
            Some(&serde_json::json!(2))
        );
    }

    #[tokio::test]
    async fn test_load_from_pdf_dir_validation() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("doc.txt");
        std::fs::write(&file, "x").unwrap();
        let loader = SourceLoader::new();

        let err = loader
            .load_from_pdf_dir(dir.path().join("nope"))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Directory does not exist"));

        let err = loader.load_from_pdf_dir(&file).await.unwrap_err();
        assert!(err.to_string().starts_with("Provided path is not a directory"));
    }

    #[tokio::test]
    async fn test_load_from_pdf_dir_extraction_failure() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.pdf"), b"garbage").unwrap();
        let loader = SourceLoader::new().with_pdf_extractor(Arc::new(BrokenPdf));

        let err = loader.load_from_pdf_dir(dir.path()).await.unwrap_err();
        match err {
            RagentError::LoadFailure { target, .. } => assert!(target.ends_with("bad.pdf")),
            other => panic!("expected LoadFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_load_documents_empty_is_invalid() {
        let sources: [&str; 0] = [];
        let err = SourceLoader::new()
            .load_documents(&sources)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Parameter 'sources' must be a non-empty sequence."
        );
    }

    #[tokio::test]
    async fn test_load_documents_mixed_sources_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let txt = dir.path().join("facts.txt");
        std::fs::write(&txt, "text body").unwrap();
        let pdfs = dir.path().join("pdfs");
        std::fs::create_dir(&pdfs).unwrap();
        std::fs::write(pdfs.join("x.pdf"), b"%PDF").unwrap();

        let (loader, fetcher) = static_loader(vec![Document::new("web body")]);
        let sources = vec![
            "https://example.com/page".to_string(),
            String::new(),
            txt.display().to_string(),
            pdfs.display().to_string(),
        ];
        let docs = loader.load_documents(&sources).await.unwrap();

        let contents: Vec<&str> = docs.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(
            contents,
            vec!["web body", "text body", "x.pdf page one", "x.pdf page two"]
        );
        assert_eq!(fetcher.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_load_documents_unsupported_suffix_aborts_batch() {
        let dir = tempfile::tempdir().unwrap();
        let txt = dir.path().join("ok.txt");
        let docx = dir.path().join("report.docx");
        std::fs::write(&txt, "fine").unwrap();
        std::fs::write(&docx, "binary").unwrap();

        let sources = [txt.display().to_string(), docx.display().to_string()];
        let err = SourceLoader::new()
            .load_documents(&sources)
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Unsupported file type: .docx"));
    }

    #[tokio::test]
    async fn test_load_documents_missing_path() {
        let err = SourceLoader::new()
            .load_documents(&["/definitely/not/here.txt"])
            .await
            .unwrap_err();
        assert!(matches!(err, RagentError::InvalidInput { .. }));
        assert!(err.to_string().starts_with("Source path does not exist"));
    }

    #[tokio::test]
    async fn test_source_kind_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let txt = dir.path().join("a.txt");
        std::fs::write(&txt, "x").unwrap();

        assert_eq!(
            SourceKind::resolve("https://Example.com").await.unwrap(),
            SourceKind::Url("https://Example.com".into())
        );
        // An upper-case scheme is not a URL and falls through to the path check.
        assert!(matches!(
            SourceKind::resolve("HTTPS://Example.com").await,
            Err(RagentError::InvalidInput { .. })
        ));
        assert_eq!(
            SourceKind::resolve(&txt.display().to_string()).await.unwrap(),
            SourceKind::TextFile(txt.clone())
        );
        assert_eq!(
            SourceKind::resolve(&dir.path().display().to_string())
                .await
                .unwrap(),
            SourceKind::PdfDirectory(dir.path().to_path_buf())
        );
    }

    #[test]
    fn test_extract_text_from_html() {
        let html = "<html><head><title>Capitals</title><style>p{}</style></head>\
                    <body><h1>Europe</h1><p>Paris &amp; Rome</p><script>var x=1;</script></body></html>";
        let text = extract_text_from_html(html);
        assert_eq!(text, "Capitals\nEurope\nParis & Rome");
    }

    #[test]
    fn test_extract_title() {
        assert_eq!(
            extract_title("<HTML><TITLE lang=\"en\"> A &amp; B </TITLE></HTML>"),
            Some("A & B".into())
        );
        assert_eq!(extract_title("<p>no title</p>"), None);
    }
}
