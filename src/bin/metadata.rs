#![deny(warnings, clippy::all)]

use clap::Parser;
use ctf_ir::{prelude::*, tracing::try_init_tracing_subscriber};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Build a CTF trace from a configuration file and print its TSDL metadata
#[derive(Parser, Debug, Clone)]
#[clap(version)]
pub struct Opts {
    #[clap(flatten)]
    pub ir_opts: IrOpts,

    /// Write the metadata to a file instead of stdout
    #[clap(long, short = 'o', name = "output", help_heading = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Create an event of every event class, reporting the ones that fail
    #[clap(long, name = "check-events", help_heading = "OUTPUT")]
    pub check_events: bool,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Ir(#[from] ctf_ir::error::Error),

    #[error("Writing metadata to '{path}' failed")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} event class(es) could not produce an event")]
    EventCheck(usize),
}

fn main() {
    match do_main() {
        Ok(()) => (),
        Err(e) => {
            eprintln!("{e}");
            let mut cause = e.source();
            while let Some(err) = cause {
                eprintln!("Caused by: {err}");
                cause = err.source();
            }
            std::process::exit(exitcode::SOFTWARE);
        }
    }
}

fn do_main() -> Result<(), Box<dyn std::error::Error>> {
    let opts = Opts::parse();

    try_init_tracing_subscriber()?;

    let cfg = IrConfig::load_merge_with_opts(opts.ir_opts)?;
    let mut trace = cfg.build_trace().map_err(Error::from)?;
    debug!(
        uuid = %trace.uuid(),
        stream_classes = trace.stream_class_count(),
        "Built trace"
    );

    if opts.check_events {
        let failures = check_events(&mut trace);
        if failures != 0 {
            return Err(Error::EventCheck(failures).into());
        }
    }

    let metadata = MetadataWriter::new(&trace).to_string();
    match opts.output {
        Some(path) => fs::write(&path, metadata).map_err(|source| Error::Output {
            path: path.clone(),
            source,
        })?,
        None => print!("{metadata}"),
    }

    Ok(())
}

/// Run the event assembly once per event class, returning the number of failures.
fn check_events(trace: &mut Trace) -> usize {
    let event_classes: Vec<Arc<EventClass>> = trace
        .stream_classes()
        .iter()
        .flat_map(|sc| sc.event_classes().cloned())
        .collect();

    let mut failures = 0;
    for ec in event_classes.iter() {
        match trace.create_event(ec) {
            Ok(_) => debug!(event_class = ec.name(), "Created event"),
            Err(e) => {
                warn!(event_class = ec.name(), err = %e, "Failed to create event");
                failures += 1;
            }
        }
    }
    failures
}
