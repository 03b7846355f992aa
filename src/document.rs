/// Document engine and print surface.
///
/// The editor that renders and serializes documents lives outside this
/// crate; the orchestrator reaches it through [`DocumentEngine`]. The
/// workspace implementation below keeps the active document as a JSON file so
/// the CLI has something to save.

use std::fmt;
use std::io::Write;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Error, Result};
use crate::records::DEFAULT_DOCUMENT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Default,
    Iphone,
    Ipad,
    Android,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceKind::Default => "default",
            DeviceKind::Iphone => "iphone",
            DeviceKind::Ipad => "ipad",
            DeviceKind::Android => "android",
        })
    }
}

/// Blank home template for a device, serialized as the editor expects it.
pub fn default_template(device: DeviceKind) -> String {
    let columns = match device {
        DeviceKind::Iphone | DeviceKind::Android => 6,
        DeviceKind::Ipad => 10,
        DeviceKind::Default => 26,
    };
    json!({
        "numsheets": 1,
        "currentid": "sheet1",
        "currentname": "sheet1",
        "sheetArr": {
            "sheet1": {
                "sheetstr": {
                    "savestr": format!("version:1.5\nsheet:c:{columns}:r:50\n")
                },
                "name": "sheet1",
                "hidden": "0"
            }
        }
    })
    .to_string()
}

pub trait DocumentEngine: Send + Sync {
    /// Current document in its save format.
    fn serialized_content(&self) -> Result<String>;

    /// Current document as printable markup.
    fn renderable_content(&self) -> Result<String>;

    fn device_profile(&self) -> DeviceKind;

    /// Replace the active document.
    fn load_document(&self, name: &str, template_json: &str) -> Result<()>;

    /// Record `name` as the active document's name, keeping its content.
    fn select_document(&self, name: &str) -> Result<()>;
}

pub trait PrintSurface: Send + Sync {
    fn print(&self, markup: &str) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveDocument {
    pub name: String,
    pub content: String,
}

/// Active document stored as `document.json` in the workspace.
pub struct WorkspaceDocument {
    path: PathBuf,
    device: DeviceKind,
}

impl WorkspaceDocument {
    pub fn new(path: impl Into<PathBuf>, device: DeviceKind) -> Self {
        Self {
            path: path.into(),
            device,
        }
    }

    fn store(&self, doc: &ActiveDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(doc)
            .map_err(|e| Error::Serialization(format!("active document: {e}")))?;
        std::fs::write(&self.path, bytes)?;
        Ok(())
    }

    /// The stored document, or the default template when nothing is open.
    pub fn active(&self) -> Result<ActiveDocument> {
        match std::fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| Error::Serialization(format!("active document: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ActiveDocument {
                name: DEFAULT_DOCUMENT.to_string(),
                content: default_template(self.device),
            }),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

impl DocumentEngine for WorkspaceDocument {
    fn serialized_content(&self) -> Result<String> {
        Ok(self.active()?.content)
    }

    fn renderable_content(&self) -> Result<String> {
        let doc = self.active()?;
        Ok(format!(
            "<html><head><title>{title}</title></head><body><pre>{body}</pre></body></html>",
            title = escape_html(&doc.name),
            body = escape_html(&doc.content),
        ))
    }

    fn device_profile(&self) -> DeviceKind {
        self.device
    }

    fn load_document(&self, name: &str, template_json: &str) -> Result<()> {
        self.store(&ActiveDocument {
            name: name.to_string(),
            content: template_json.to_string(),
        })
    }

    fn select_document(&self, name: &str) -> Result<()> {
        let mut doc = self.active()?;
        if doc.name != name {
            doc.name = name.to_string();
            self.store(&doc)?;
        }
        Ok(())
    }
}

/// Writes printable markup to a file, or stdout when no file is given.
pub struct HtmlPrinter {
    out: Option<PathBuf>,
}

impl HtmlPrinter {
    pub fn new(out: Option<PathBuf>) -> Self {
        Self { out }
    }
}

impl PrintSurface for HtmlPrinter {
    fn print(&self, markup: &str) -> Result<()> {
        match &self.out {
            Some(path) => std::fs::write(path, markup)?,
            None => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(markup.as_bytes())?;
                stdout.write_all(b"\n")?;
            }
        }
        Ok(())
    }
}
