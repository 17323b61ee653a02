//! JSON report adapter implementing ReportPort.

use std::fs;
use std::path::Path;

use crate::domain::error::BreadthscanError;
use crate::domain::scan::ScanReport;
use crate::ports::report_port::ReportPort;

pub struct JsonReportAdapter;

impl JsonReportAdapter {
    pub fn new() -> Self {
        Self
    }

    pub fn render(report: &ScanReport) -> Result<String, BreadthscanError> {
        Ok(serde_json::to_string_pretty(report)?)
    }
}

impl Default for JsonReportAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportPort for JsonReportAdapter {
    fn write(&self, report: &ScanReport, output_path: &str) -> Result<(), BreadthscanError> {
        let json = Self::render(report)?;

        let path = Path::new(output_path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(BreadthscanError::Io)?;
        }
        fs::write(path, json).map_err(BreadthscanError::Io)?;

        Ok(())
    }
}
