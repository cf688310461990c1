use anyhow::{anyhow, Context, Result};
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use lopdf::Document as PdfDocument;
use pulldown_cmark::{html, Options, Parser as MdParser};
use scraper::{Html, Selector};
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::{debug, warn};

use crate::models::SourceType;

#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub content: String,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone)]
pub struct DocumentMetadata {
    pub source_type: SourceType,
    pub mime_type: String,
    pub pages: Option<usize>,
    pub char_count: usize,
    pub encoding: String,
}

pub struct DocumentParser;

impl DocumentParser {
    /// Parse uploaded bytes into plain text, detecting the format from the
    /// filename extension with a content-sniffing fallback.
    pub fn parse_bytes(data: &[u8], filename: &str) -> Result<ParsedDocument> {
        let source_type = Self::detect_type(data, filename);
        debug!("Parsing {} as {:?}", filename, source_type);

        let mime_type = mime_guess::from_path(filename)
            .first_or_text_plain()
            .essence_str()
            .to_string();

        let (content, pages, encoding) = match source_type {
            SourceType::Pdf => {
                let (text, pages) = Self::parse_pdf(data)?;
                (text, Some(pages), "UTF-8".to_string())
            }
            SourceType::Docx => (Self::parse_docx(data)?, None, "UTF-8".to_string()),
            SourceType::Markdown => {
                let (raw, encoding) = Self::decode_text(data);
                (Self::parse_markdown(&raw)?, None, encoding.name().to_string())
            }
            SourceType::Html => {
                let (raw, encoding) = Self::decode_text(data);
                (Self::extract_html_text(&raw), None, encoding.name().to_string())
            }
            SourceType::Txt => {
                let (raw, encoding) = Self::decode_text(data);
                (raw, None, encoding.name().to_string())
            }
        };

        debug!("Extracted {} characters from {}", content.len(), filename);

        let char_count = content.chars().count();
        Ok(ParsedDocument {
            content,
            metadata: DocumentMetadata {
                source_type,
                mime_type,
                pages,
                char_count,
                encoding,
            },
        })
    }

    fn detect_type(data: &[u8], filename: &str) -> SourceType {
        if let Some(source_type) = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(SourceType::from_extension)
        {
            return source_type;
        }

        // No usable extension: sniff the content.
        match infer::get(data).map(|kind| kind.mime_type()) {
            Some("application/pdf") => SourceType::Pdf,
            Some("application/zip")
            | Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document") => {
                SourceType::Docx
            }
            _ => {
                warn!("Unknown file type for {}, treating as text", filename);
                SourceType::Txt
            }
        }
    }

    /// Extract text page by page; a failing page is skipped, not fatal.
    fn parse_pdf(data: &[u8]) -> Result<(String, usize)> {
        let doc = PdfDocument::load_mem(data).context("Failed to load PDF")?;
        let pages = doc.get_pages();
        let page_count = pages.len();

        let mut content = String::new();
        for (page_num, _) in pages.iter() {
            match doc.extract_text(&[*page_num]) {
                Ok(text) => {
                    content.push_str(&text);
                    content.push('\n');
                }
                Err(e) => {
                    warn!("Failed to extract text from page {}: {}", page_num, e);
                }
            }
        }

        if content.trim().is_empty() {
            return Err(anyhow!("No text could be extracted from PDF"));
        }
        Ok((content, page_count))
    }

    /// DOCX is a ZIP; the body lives in word/document.xml. Paragraph tags
    /// become paragraph breaks so the chunker sees real boundaries.
    fn parse_docx(data: &[u8]) -> Result<String> {
        let mut archive =
            zip::ZipArchive::new(Cursor::new(data)).context("Failed to open DOCX as ZIP")?;
        let mut xml = String::new();
        archive
            .by_name("word/document.xml")
            .context("DOCX missing word/document.xml")?
            .read_to_string(&mut xml)
            .context("Failed to read document.xml")?;

        let paragraphs: Vec<String> = xml
            .split("</w:p>")
            .map(strip_xml_tags)
            .filter(|p| !p.is_empty())
            .collect();

        if paragraphs.is_empty() {
            return Err(anyhow!("No text content found in DOCX"));
        }
        Ok(paragraphs.join("\n\n"))
    }

    /// Markdown goes through HTML so formatting collapses to plain text.
    fn parse_markdown(raw: &str) -> Result<String> {
        let parser = MdParser::new_ext(raw, Options::all());
        let mut html_output = String::new();
        html::push_html(&mut html_output, parser);
        Ok(Self::extract_html_text(&html_output))
    }

    /// Pull text out of block-level elements, one paragraph per block.
    fn extract_html_text(html: &str) -> String {
        let document = Html::parse_document(html);
        let block_selector =
            Selector::parse("p, h1, h2, h3, h4, h5, h6, li, pre, blockquote").unwrap();

        let blocks: Vec<String> = document
            .select(&block_selector)
            .map(|element| {
                element
                    .text()
                    .collect::<String>()
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .filter(|block| !block.is_empty())
            .collect();

        if !blocks.is_empty() {
            return blocks.join("\n\n");
        }

        // Markup without block elements: fall back to all text nodes.
        let body_selector = Selector::parse("body").unwrap();
        document
            .select(&body_selector)
            .flat_map(|element| element.text())
            .collect::<String>()
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn decode_text(bytes: &[u8]) -> (String, &'static Encoding) {
        if let Ok(text) = std::str::from_utf8(bytes) {
            return (text.to_string(), UTF_8);
        }
        let (decoded, _, _) = WINDOWS_1252.decode(bytes);
        (decoded.into_owned(), WINDOWS_1252)
    }
}

/// Drop XML tags, keeping a space between adjacent runs of text.
fn strip_xml_tags(xml: &str) -> String {
    let mut text = String::new();
    let mut inside_tag = false;
    for c in xml.chars() {
        if c == '<' {
            inside_tag = true;
        } else if c == '>' {
            inside_tag = false;
            text.push(' ');
        } else if !inside_tag {
            text.push(c);
        }
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    #[test]
    fn test_plain_text_passthrough() {
        let parsed = DocumentParser::parse_bytes(b"Just some text.", "notes.txt").unwrap();
        assert_eq!(parsed.content, "Just some text.");
        assert_eq!(parsed.metadata.source_type, SourceType::Txt);
        assert_eq!(parsed.metadata.encoding, "UTF-8");
    }

    #[test]
    fn test_markdown_collapses_to_plain_text() {
        let md = "# Title\n\nSome *emphasized* prose.\n\n- item one\n- item two\n";
        let parsed = DocumentParser::parse_bytes(md.as_bytes(), "doc.md").unwrap();
        assert!(parsed.content.contains("Title"));
        assert!(parsed.content.contains("Some emphasized prose."));
        assert!(parsed.content.contains("item one"));
        assert!(!parsed.content.contains('*'));
        assert!(!parsed.content.contains('#'));
    }

    #[test]
    fn test_html_extracts_block_text() {
        let html = "<html><body><h1>Heading</h1><p>First  para.</p>\
                    <script>ignore_me();</script><p>Second para.</p></body></html>";
        let parsed = DocumentParser::parse_bytes(html.as_bytes(), "page.html").unwrap();
        assert_eq!(parsed.content, "Heading\n\nFirst para.\n\nSecond para.");
        assert!(!parsed.content.contains("ignore_me"));
    }

    #[test]
    fn test_docx_paragraphs_become_breaks() {
        let xml = r#"<?xml version="1.0"?><w:document><w:body>
            <w:p><w:r><w:t>First paragraph.</w:t></w:r></w:p>
            <w:p><w:r><w:t>Second paragraph.</w:t></w:r></w:p>
            </w:body></w:document>"#;

        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            let options =
                SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
            writer.start_file("word/document.xml", options).unwrap();
            writer.write_all(xml.as_bytes()).unwrap();
            writer.finish().unwrap();
        }

        let parsed =
            DocumentParser::parse_bytes(buffer.get_ref(), "report.docx").unwrap();
        assert!(parsed.content.starts_with("First paragraph."));
        assert!(parsed.content.contains("\n\n"));
        assert!(parsed.content.contains("Second paragraph."));
    }

    #[test]
    fn test_unknown_extension_sniffs_content() {
        let parsed = DocumentParser::parse_bytes(b"plain body", "upload.bin").unwrap();
        assert_eq!(parsed.metadata.source_type, SourceType::Txt);
    }

    #[test]
    fn test_non_utf8_text_decodes_lossy() {
        // 0xE9 is é in Windows-1252 and invalid on its own in UTF-8.
        let parsed = DocumentParser::parse_bytes(b"caf\xE9 notes", "legacy.txt").unwrap();
        assert!(parsed.content.contains("café"));
        assert_eq!(parsed.metadata.encoding, "windows-1252");
    }
}
