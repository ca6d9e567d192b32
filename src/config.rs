use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Grade aggregation sidecar. Reads one JSON request per line on stdin and
/// answers one JSON response per line on stdout. Logs go to stderr.
#[derive(Debug, Clone, Parser)]
#[command(name = "gradebookd", version)]
pub struct Config {
    /// Workspace directory to open before the first request
    #[arg(long, env = "GRADEBOOKD_WORKSPACE", value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// Start with the in-memory demo dataset instead of a workspace
    #[arg(long, env = "GRADEBOOKD_DEMO", default_value_t = false, conflicts_with = "workspace")]
    pub demo: bool,

    /// Log line format on stderr
    #[arg(long, env = "GRADEBOOKD_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_leave_store_unselected() {
        let cfg = Config::try_parse_from(["gradebookd"]).expect("parse");
        assert_eq!(cfg.workspace, None);
        assert!(!cfg.demo);
        assert_eq!(cfg.log_format, LogFormat::Text);
    }

    #[test]
    fn workspace_and_json_logs() {
        let cfg = Config::try_parse_from([
            "gradebookd",
            "--workspace",
            "/tmp/gb",
            "--log-format",
            "json",
        ])
        .expect("parse");
        assert_eq!(cfg.workspace, Some(PathBuf::from("/tmp/gb")));
        assert_eq!(cfg.log_format, LogFormat::Json);
    }

    #[test]
    fn demo_conflicts_with_workspace() {
        assert!(Config::try_parse_from(["gradebookd", "--demo", "--workspace", "/tmp/gb"]).is_err());
    }
}
