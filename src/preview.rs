//! Preview artifact and the operator's go/no-go decision.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime};
use console::style;
use maud::{DOCTYPE, Markup, PreEscaped, html};
use tracing::info;

use crate::content::NoteContent;
use crate::images::{ImageAsset, ImageKind};

const SCHEDULE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const CSS: &str = r#"
body { margin: 0; background: #f5f5f5; font-family: -apple-system, "PingFang SC", "Helvetica Neue", sans-serif; }
.phone { max-width: 420px; margin: 24px auto; background: #fff; border-radius: 16px; overflow: hidden; box-shadow: 0 4px 24px rgba(0,0,0,.08); }
.cover img { width: 100%; aspect-ratio: 3 / 4; object-fit: cover; display: block; }
.gallery { display: flex; gap: 4px; overflow-x: auto; padding: 4px; }
.gallery img { height: 120px; aspect-ratio: 3 / 4; object-fit: cover; border-radius: 6px; }
.note { padding: 16px 20px; }
.note h1 { font-size: 20px; line-height: 1.4; margin: 0 0 12px; }
.note p { font-size: 15px; line-height: 1.7; color: #333; margin: 0 0 10px; }
.tags span { color: #13386c; margin-right: 8px; font-size: 14px; }
.actions { display: flex; gap: 12px; padding: 16px 20px 24px; }
.actions button { flex: 1; padding: 12px; border: 0; border-radius: 22px; font-size: 15px; }
.actions .publish { background: #ff2442; color: #fff; }
.actions .cancel { background: #eee; color: #333; }
.hint { text-align: center; font-size: 12px; color: #999; padding-bottom: 16px; }
"#;

/// Renders a self-contained HTML preview of the note.
///
/// The two buttons are advisory; the decision is taken in the terminal.
pub fn render(title: &str, body: &str, tags: &[String], images: &[ImageAsset]) -> String {
    let cover = images.iter().find(|a| a.kind == ImageKind::Cover);
    let gallery: Vec<&ImageAsset> = images.iter().filter(|a| a.kind == ImageKind::Content).collect();

    let page: Markup = html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { "Preview: " (title) }
                style { (PreEscaped(CSS)) }
            }
            body {
                div.phone {
                    @if let Some(cover) = cover {
                        div.cover { img src=(image_src(&cover.path)) alt="cover"; }
                    }
                    @if !gallery.is_empty() {
                        div.gallery {
                            @for asset in &gallery {
                                img src=(image_src(&asset.path)) alt={ "image " (asset.index) };
                            }
                        }
                    }
                    div.note {
                        h1 { (title) }
                        @for paragraph in paragraphs(body) {
                            p {
                                @for (i, line) in paragraph.iter().enumerate() {
                                    @if i > 0 { br; }
                                    (line)
                                }
                            }
                        }
                        div.tags {
                            @for tag in tags {
                                span { (tag) }
                            }
                        }
                    }
                    div.actions {
                        button.cancel type="button" { "Cancel" }
                        button.publish type="button" { "Publish" }
                    }
                    p.hint { "Confirm or cancel in the terminal." }
                }
            }
        }
    };
    page.into_string()
}

fn paragraphs(body: &str) -> Vec<Vec<&str>> {
    body.split("\n\n")
        .map(|p| p.lines().map(str::trim).filter(|l| !l.is_empty()).collect::<Vec<_>>())
        .filter(|p| !p.is_empty())
        .collect()
}

fn image_src(path: &Path) -> String {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    format!("file://{}", absolute.display())
}

/// Writes previews to disk.
pub struct PreviewGate {
    preview_dir: PathBuf,
}

impl PreviewGate {
    pub fn new(preview_dir: &Path) -> Self {
        Self {
            preview_dir: preview_dir.to_path_buf(),
        }
    }

    /// Renders and stores `<preview_dir>/preview_<millis>.html`.
    pub fn present(&self, content: &NoteContent, images: &[ImageAsset]) -> io::Result<PathBuf> {
        std::fs::create_dir_all(&self.preview_dir)?;
        let path = self
            .preview_dir
            .join(format!("preview_{}.html", Local::now().timestamp_millis()));
        std::fs::write(&path, render(&content.title, &content.body, &content.tags, images))?;
        info!(path = %path.display(), "preview written");
        Ok(path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Publish,
    PublishAt(DateTime<Local>),
    Cancel,
}

/// Where the operator's decision comes from. Blocks until one is given.
pub trait DecisionSource {
    fn decide(&mut self, preview: &Path) -> io::Result<Decision>;
}

/// Asks on a line-oriented terminal. End of input counts as cancel.
pub struct TerminalDecision<R, W> {
    input: R,
    output: W,
}

impl TerminalDecision<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalDecision<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn ask(&mut self, question: &str) -> io::Result<Option<String>> {
        write!(self.output, "{} ", style(question).bold())?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn ask_yes_no(&mut self, question: &str) -> io::Result<Option<bool>> {
        loop {
            let Some(answer) = self.ask(question)? else {
                return Ok(None);
            };
            match answer.to_lowercase().as_str() {
                "y" | "yes" => return Ok(Some(true)),
                "n" | "no" => return Ok(Some(false)),
                _ => writeln!(self.output, "Please answer y or n.")?,
            }
        }
    }
}

impl<R: BufRead, W: Write> DecisionSource for TerminalDecision<R, W> {
    fn decide(&mut self, preview: &Path) -> io::Result<Decision> {
        writeln!(self.output, "Preview: {}", style(preview.display()).cyan())?;

        match self.ask_yes_no("Publish this note? (y/n)")? {
            Some(true) => {}
            Some(false) | None => return Ok(Decision::Cancel),
        }
        match self.ask_yes_no("Schedule for later? (y/n)")? {
            Some(true) => {}
            Some(false) => return Ok(Decision::Publish),
            None => return Ok(Decision::Cancel),
        }

        loop {
            let Some(raw) = self.ask("Publish at (YYYY-MM-DD HH:MM:SS):")? else {
                return Ok(Decision::Cancel);
            };
            match parse_schedule(&raw) {
                Some(at) => return Ok(Decision::PublishAt(at)),
                None => writeln!(self.output, "Could not read {raw:?}, expected e.g. 2025-06-01 09:30:00.")?,
            }
        }
    }
}

pub fn parse_schedule(raw: &str) -> Option<DateTime<Local>> {
    NaiveDateTime::parse_from_str(raw.trim(), SCHEDULE_FORMAT)
        .ok()?
        .and_local_timezone(Local)
        .single()
}
