//! Per-run log directories and scalar metric sinks.
//!
//! Each experiment run writes into `<log_root>/experiment-<N>`. The id is
//! chosen by the caller; [`RunId::next_available`] picks one past the highest
//! existing directory. Directories are never reused.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const RUN_PREFIX: &str = "experiment-";
pub const EVENTS_FILE: &str = "events.jsonl";

/// Identifier of one experiment run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(pub u32);

impl RunId {
    /// Directory name of the run, e.g. `experiment-3`.
    pub fn dir_name(&self) -> String {
        format!("{RUN_PREFIX}{}", self.0)
    }

    /// One past the highest `experiment-<N>` directory under `root`, or 1 when
    /// there is none (including when `root` does not exist yet).
    pub fn next_available(root: impl AsRef<Path>) -> Result<RunId> {
        let root = root.as_ref();
        if !root.exists() {
            return Ok(RunId(1));
        }

        let mut max_id = 0u32;
        for entry in fs::read_dir(root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let id = name
                .strip_prefix(RUN_PREFIX)
                .and_then(|n| n.parse::<u32>().ok());
            if let Some(id) = id {
                max_id = max_id.max(id);
            }
        }
        max_id
            .checked_add(1)
            .map(RunId)
            .ok_or_else(|| Error::config(format!("no run id left after {RUN_PREFIX}{max_id}")))
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A freshly created run directory.
#[derive(Debug, Clone)]
pub struct RunDirectory {
    id: RunId,
    path: PathBuf,
}

impl RunDirectory {
    /// Creates `<root>/experiment-<id>`, creating `root` as needed.
    ///
    /// Fails with [`Error::RunDirectoryExists`] if the run directory is
    /// already there, so two runs never share a history.
    pub fn create(root: impl AsRef<Path>, id: RunId) -> Result<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root)?;
        let path = root.join(id.dir_name());
        match fs::create_dir(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(Error::RunDirectoryExists(path))
            }
            Err(e) => return Err(e.into()),
        }
        tracing::info!(run = %id, path = %path.display(), "created run directory");
        Ok(Self { id, path })
    }

    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of a file inside the run directory.
    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

/// One scalar measurement, as stored in `events.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarEvent {
    /// Seconds since the Unix epoch.
    pub wall_time: f64,
    pub step: usize,
    pub tag: String,
    /// Non-finite values are stored as the strings `"NaN"`, `"inf"` and `"-inf"`.
    #[serde(with = "scalar_value")]
    pub value: f32,
}

mod scalar_value {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f32),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &f32, serializer: S) -> Result<S::Ok, S::Error> {
        let repr = if value.is_nan() {
            Repr::Text("NaN".into())
        } else if value.is_infinite() {
            Repr::Text(if *value > 0.0 { "inf" } else { "-inf" }.into())
        } else {
            Repr::Number(*value)
        };
        repr.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(v) => Ok(v),
            Repr::Text(text) => match text.as_str() {
                "NaN" => Ok(f32::NAN),
                "inf" => Ok(f32::INFINITY),
                "-inf" => Ok(f32::NEG_INFINITY),
                other => Err(D::Error::custom(format!("invalid scalar value {other:?}"))),
            },
        }
    }
}

impl ScalarEvent {
    pub fn now(step: usize, tag: &str, value: f32) -> Self {
        let wall_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        Self {
            wall_time,
            step,
            tag: tag.to_string(),
            value,
        }
    }
}

/// Destination for per-epoch scalars.
pub trait MetricSink {
    fn log_scalar(&mut self, step: usize, tag: &str, value: f32) -> Result<()>;
}

fn append_json_line<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    serde_json::to_writer(&mut file, value)?;
    file.write_all(b"\n")?;
    Ok(())
}

/// Append-only JSON-lines event file.
#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    /// Event log at `<run>/events.jsonl`.
    pub fn new(run: &RunDirectory) -> Self {
        Self::at(run.file(EVENTS_FILE))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetricSink for EventLog {
    fn log_scalar(&mut self, step: usize, tag: &str, value: f32) -> Result<()> {
        append_json_line(&self.path, &ScalarEvent::now(step, tag, value))
    }
}

/// Reads every event of a JSON-lines event file in order.
pub fn read_events(path: impl AsRef<Path>) -> Result<Vec<ScalarEvent>> {
    let reader = BufReader::new(fs::File::open(path)?);
    let mut events = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        events.push(serde_json::from_str(&line)?);
    }
    Ok(events)
}

/// Keeps events in memory.
#[derive(Debug, Default, Clone)]
pub struct InMemorySink {
    events: Vec<ScalarEvent>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[ScalarEvent] {
        &self.events
    }

    /// Values logged under `tag`, in logging order.
    pub fn values(&self, tag: &str) -> Vec<f32> {
        self.events
            .iter()
            .filter(|e| e.tag == tag)
            .map(|e| e.value)
            .collect()
    }
}

impl MetricSink for InMemorySink {
    fn log_scalar(&mut self, step: usize, tag: &str, value: f32) -> Result<()> {
        self.events.push(ScalarEvent::now(step, tag, value));
        Ok(())
    }
}
