//! Process-pool worker.
//!
//! Reads task frames from stdin, runs each chunk's pipeline and writes a
//! result frame to stdout. Exits cleanly when stdin closes. Logs go to
//! stderr since stdout carries the frames.

use std::io::{self, BufReader, BufWriter};
use std::process::ExitCode;

use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use halo_pipeline::wire::{encode_frame, read_frame, write_encoded, ResultFrame, TaskFrame};
use halo_pipeline::Result;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .try_init();
}

fn serve() -> Result<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut reader = BufReader::new(stdin.lock());
    let mut writer = BufWriter::new(stdout.lock());

    while let Some(frame) = read_frame::<_, TaskFrame>(&mut reader)? {
        let index = frame.index;
        let result = frame.into_task().and_then(|task| task.process());
        if let Err(e) = &result {
            debug!(chunk = index, error = %e, "chunk failed");
        }

        // An oversized result is reported as a failed chunk, not a dead worker.
        let bytes = match encode_frame(&ResultFrame::new(index, result)) {
            Ok(bytes) => bytes,
            Err(e) => encode_frame(&ResultFrame {
                index,
                outcome: Err(format!("cannot frame result: {}", e)),
            })?,
        };
        write_encoded(&mut writer, &bytes)?;
    }
    Ok(())
}

fn main() -> ExitCode {
    init_tracing();
    debug!(pid = std::process::id(), "worker started");

    match serve() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "worker stopped");
            ExitCode::FAILURE
        }
    }
}
