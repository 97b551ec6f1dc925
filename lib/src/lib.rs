use std::io::Read;

use crate::message::Message;

/// Initialize logging with the given default level. Respects `RUST_LOG`
/// overrides.
pub fn init_logging(default_level: log::LevelFilter) {
    env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .init();
}

pub mod analysis;
pub mod message;
pub mod milenage;
pub mod profile;
pub mod protocol;
pub mod util;
pub mod vector;

pub use analysis::analyzer::{AnalysisError, AnalysisReport, AnalyzerConfig, Harness};

/// Reads a dissected capture: a JSON array of messages in capture order.
pub fn read_trace<R: Read>(reader: R) -> Result<Vec<Message>, serde_json::Error> {
    serde_json::from_reader(reader)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_trace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.json");
        std::fs::write(
            &path,
            r#"[
                {"id": 0, "summary": "RRCConnectionRequest"},
                {"id": 1, "summary": "RRCConnectionSetupComplete, Attach request",
                 "fields": {"nas_eps.nas_msg_emm_type": "65"}}
            ]"#,
        )
        .unwrap();

        let trace = read_trace(std::fs::File::open(&path).unwrap()).unwrap();
        assert_eq!(trace.len(), 2);
        assert_eq!(trace[1].get("nas_eps.nas_msg_emm_type"), Some("65"));
    }

    #[test]
    fn test_read_trace_rejects_garbage() {
        assert!(read_trace("not json".as_bytes()).is_err());
    }
}
