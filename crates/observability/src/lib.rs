//! Tracing and logging setup shared by binaries.

/// Initialize process-wide tracing with the default format (JSON).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(tracing::LogFormat::Json);
}

/// Subscriber configuration (filters, formats).
pub mod tracing;
