//! Report output port trait.

use crate::domain::error::BreadthscanError;
use crate::domain::scan::ScanReport;

pub trait ReportPort {
    fn write(&self, report: &ScanReport, output_path: &str) -> Result<(), BreadthscanError>;
}
