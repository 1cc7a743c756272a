use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::warn;

/// External profiler that wants to know where generated routines live.
///
/// Notifications are best effort: an agent never reports failure back to the
/// code generator.
pub trait ProfilingAgent {
    /// Whether notifications are consumed at all. Inactive agents let the
    /// caller skip building method names.
    fn is_active(&self) -> bool {
        true
    }

    fn notify_method_loaded(&self, name: &str, entry: *const u8, len: usize);
}

/// Agent used when no profiler is attached
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAgent;

impl ProfilingAgent for NoopAgent {
    fn is_active(&self) -> bool {
        false
    }

    fn notify_method_loaded(&self, _name: &str, _entry: *const u8, _len: usize) {}
}

enum Sink {
    Closed,
    Open(BufWriter<File>),
    Failed,
}

/// Writes Linux `perf` JIT map entries (`START SIZE NAME`, hex addresses).
///
/// `perf report` picks up `/tmp/perf-<pid>.map` to symbolize samples that land
/// in anonymous executable memory.
pub struct PerfMapAgent {
    path: PathBuf,
    sink: Mutex<Sink>,
}

impl PerfMapAgent {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sink: Mutex::new(Sink::Closed),
        }
    }

    /// Agent writing to the map file `perf` looks for in this process.
    pub fn for_current_process() -> Self {
        Self::new(format!("/tmp/perf-{}.map", std::process::id()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> std::io::Result<BufWriter<File>> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map(BufWriter::new)
    }
}

impl ProfilingAgent for PerfMapAgent {
    fn notify_method_loaded(&self, name: &str, entry: *const u8, len: usize) {
        let mut sink = self.sink.lock();

        if matches!(*sink, Sink::Closed) {
            *sink = match self.open() {
                Ok(writer) => Sink::Open(writer),
                Err(err) => {
                    warn!(path = %self.path.display(), %err, "cannot open perf map");
                    Sink::Failed
                }
            };
        }

        if let Sink::Open(writer) = &mut *sink {
            let written = writeln!(writer, "{:x} {:x} {}", entry as usize, len, name)
                .and_then(|()| writer.flush());
            if let Err(err) = written {
                warn!(path = %self.path.display(), %err, "perf map disabled after write failure");
                *sink = Sink::Failed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_agent_is_inactive() {
        assert!(!NoopAgent.is_active());
        NoopAgent.notify_method_loaded("ignored", std::ptr::null(), 4);
    }

    #[test]
    fn perf_map_lines_use_hex_address_and_size() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("perf-test.map");
        let agent = PerfMapAgent::new(&path);

        agent.notify_method_loaded("fill<0000000000000001>()", 0x1000 as *const u8, 0x2a);
        agent.notify_method_loaded("fill<0000000000000002>()", 0x1030 as *const u8, 11);

        let contents = std::fs::read_to_string(&path).expect("perf map written");
        assert_eq!(
            contents,
            "1000 2a fill<0000000000000001>()\n1030 b fill<0000000000000002>()\n"
        );
    }

    #[test]
    fn unwritable_path_is_swallowed() {
        let dir = tempfile::tempdir().expect("temp dir");
        let agent = PerfMapAgent::new(dir.path().join("missing").join("perf.map"));
        agent.notify_method_loaded("routine", 0x10 as *const u8, 1);
        agent.notify_method_loaded("routine", 0x20 as *const u8, 1);
        assert!(!agent.path().exists());
    }
}
