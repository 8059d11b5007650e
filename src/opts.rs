use crate::types::ByteOrder;
use clap::Parser;
use std::path::PathBuf;
use uuid::Uuid;

/// Options shared by the binaries that build a trace from a configuration file.
#[derive(Parser, Debug, Clone, Default)]
pub struct IrOpts {
    /// Use configuration from file
    #[clap(
        long = "config",
        short = 'c',
        name = "config file",
        env = "CTF_IR_CONFIG",
        help_heading = "TRACE CONFIGURATION"
    )]
    pub config_file: Option<PathBuf>,

    /// Use the given trace UUID instead of the configured (or a random) one
    #[clap(long, name = "trace-uuid", help_heading = "TRACE CONFIGURATION")]
    pub trace_uuid: Option<Uuid>,

    /// Native byte order of the trace: le, be or network
    #[clap(long, name = "byte-order", help_heading = "TRACE CONFIGURATION")]
    pub byte_order: Option<ByteOrder>,
}
