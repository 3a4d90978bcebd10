//! Progress bars that coexist with tracing output.
//!
//! Log lines are routed through the shared `MultiProgress` so bars stay
//! pinned at the bottom instead of being interleaved with log output.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::{self, Write};
use std::sync::OnceLock;
use tracing_subscriber::fmt::MakeWriter;

static MULTI: OnceLock<MultiProgress> = OnceLock::new();

fn multi() -> &'static MultiProgress {
    MULTI.get_or_init(|| {
        let mp = MultiProgress::new();
        mp.set_draw_target(ProgressDrawTarget::stderr_with_hz(10));
        mp
    })
}

/// Register a new bar with the shared draw target
pub fn add_progress_bar(len: u64) -> ProgressBar {
    let bar = multi().add(ProgressBar::new(len));
    bar.set_style(
        ProgressStyle::with_template("{msg:>12} [{bar:30.cyan}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar
}

/// `MakeWriter` that prints complete lines through the `MultiProgress`
#[derive(Default, Clone)]
pub struct ProgressLogWriter;

pub struct LineBuffer {
    pending: String,
}

impl LineBuffer {
    fn emit(line: &str) {
        let _ = multi().println(line.trim_end_matches('\r').to_string());
    }
}

impl Write for LineBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.push_str(&String::from_utf8_lossy(buf));
        while let Some(idx) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=idx).collect();
            Self::emit(line.trim_end_matches('\n'));
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.pending.is_empty() {
            Self::emit(&std::mem::take(&mut self.pending));
        }
        Ok(())
    }
}

impl Drop for LineBuffer {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

impl<'a> MakeWriter<'a> for ProgressLogWriter {
    type Writer = LineBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        LineBuffer {
            pending: String::new(),
        }
    }
}
