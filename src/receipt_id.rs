use chrono::Local;
use uuid::Uuid;

/// Generate a collision-free receipt identifier.
///
/// Format: `receipt_<YYYYmmdd_HHMMSS_ffffff>_<8 hex chars>`. The
/// microsecond-precision timestamp keeps ids roughly sortable by ingestion
/// time; the random suffix keeps them distinct even for multiple calls
/// within the same microsecond.
pub fn generate() -> String {
    let ts = Local::now().format("%Y%m%d_%H%M%S_%6f");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("receipt_{ts}_{}", &suffix[..8])
}
