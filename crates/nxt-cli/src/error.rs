use nxt_link::{BusError, ConnectionError, ExecuteError, SequenceError};
use nxt_protocol::OpCode;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by the `nxt` binary.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("cannot read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("no port given; use --port or set `port` in the config file")]
    NoPort,

    #[error("no sequence file given")]
    NoSequence,

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Execute(#[from] ExecuteError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Sequence(#[from] SequenceError),

    #[error("{opcode}: unexpected reply body")]
    UnexpectedReply { opcode: OpCode },

    #[error("JSON output error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot install Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),
}
