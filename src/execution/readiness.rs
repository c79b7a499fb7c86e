//! Readiness Gate
//!
//! Workers print a marker line (e.g. `"File imported."`) once their setup
//! phase is done and steady-state measurement may begin. The gate consumes
//! the worker's output stream line by line, echoing for operator
//! visibility, until the marker appears or the stream closes.

use std::io::{self, BufRead};

use log::warn;

/// Blocks until a line containing `marker` is read from `reader`.
///
/// Every consumed line is echoed to stdout. Returns `true` once the
/// marker is seen (the rest of the stream is left unread) and `false`
/// when the stream closes first - a soft synchronization point, so
/// callers proceed either way. No timeout is enforced; a worker that
/// never prints the marker blocks until its stream closes.
pub fn wait_for_marker<R: BufRead>(reader: &mut R, marker: &str) -> io::Result<bool> {
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line)?;

        if bytes_read == 0 {
            warn!(
                "Output stream closed before readiness marker {:?} was seen",
                marker
            );
            return Ok(false);
        }

        let trimmed = line.trim_end();
        if !trimmed.is_empty() {
            println!("{}", trimmed);
        }

        if line.contains(marker) {
            return Ok(true);
        }
    }
}
