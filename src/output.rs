use std::io::{self, Write};

use serde::Serialize;

use crate::domain::{LocalPage, OriginPage};
use crate::importer::RunReport;

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub archive_dir: String,
    pub cursor: OriginPage,
    pub busy: bool,
    pub pages: Vec<LocalPage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearReport {
    pub archive_dir: String,
    pub removed: usize,
}

/// Outcome of a trigger received on the command channel.
#[derive(Debug, Clone, Serialize)]
pub struct TriggerReply {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_report(report: &RunReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_status(report: &StatusReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_clear(report: &ClearReport) -> io::Result<()> {
        Self::print_json(report)
    }

    /// One compact line, so replies on the command channel stay line-delimited.
    pub fn print_reply(reply: &TriggerReply) -> io::Result<()> {
        let json = serde_json::to_string(reply).map_err(io::Error::other)?;
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{json}")?;
        stdout.flush()
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
