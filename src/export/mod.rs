pub mod exporter;
pub mod scanner_db;

pub use exporter::{DEFAULT_BATCH_SIZE, ExportReport, ScannerExporter};
pub use scanner_db::{CurrentBalance, ScannerDatabase, ScannerLedger, Snapshot};
