//! Channel instances: the runtime handles behind a plan's channels.
//!
//! The descriptor's transport decides how written data is held:
//! - `Stream`: a lazy iterator, handed over once and then gone.
//! - `Collection`: a shared in-memory vector.
//! - `File`: a JSON-lines file; the file is removed when the last handle
//!   referencing it drops.
//!
//! Reading a non-reusable instance consumes it; any later read fails.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use polyflow_core::channel::{ChannelDescriptor, Transport};
use polyflow_core::id::ChannelId;
use polyflow_core::types::Scalar;

use crate::error::EvalError;

pub type ScalarStream = Box<dyn Iterator<Item = Scalar> + Send>;

enum State {
    Pending,
    Collection(Arc<Vec<Scalar>>),
    Stream(ScalarStream),
    File(Arc<FileData>),
    Consumed,
}

#[derive(Debug)]
struct FileData {
    path: PathBuf,
    len: usize,
}

impl Drop for FileData {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::debug!(path = %self.path.display(), error = %e, "file channel cleanup failed");
        }
    }
}

pub struct ChannelInstance {
    channel: ChannelId,
    descriptor: ChannelDescriptor,
    file_path: Option<PathBuf>,
    state: State,
}

impl ChannelInstance {
    pub fn new(channel: ChannelId, descriptor: ChannelDescriptor) -> Self {
        Self {
            channel,
            descriptor,
            file_path: None,
            state: State::Pending,
        }
    }

    /// Backing path for file-transport instances.
    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn descriptor(&self) -> ChannelDescriptor {
        self.descriptor
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn is_written(&self) -> bool {
        !matches!(self.state, State::Pending)
    }

    pub fn is_consumed(&self) -> bool {
        matches!(self.state, State::Consumed)
    }

    /// Number of quanta if known without draining anything.
    pub fn len_hint(&self) -> Option<usize> {
        match &self.state {
            State::Collection(data) => Some(data.len()),
            State::File(file) => Some(file.len),
            _ => None,
        }
    }

    /// Write a sequence. Stream instances keep it lazy; the others drain it.
    pub fn accept_stream(&mut self, stream: ScalarStream) -> Result<(), EvalError> {
        self.ensure_pending()?;
        self.state = match self.descriptor.transport {
            Transport::Stream => State::Stream(stream),
            Transport::Collection => State::Collection(Arc::new(stream.collect())),
            Transport::File => State::File(Arc::new(self.write_file(stream)?)),
        };
        Ok(())
    }

    pub fn accept_collection(&mut self, data: Vec<Scalar>) -> Result<(), EvalError> {
        self.accept_shared(Arc::new(data))
    }

    /// Write an already shared vector without copying it for collections.
    pub fn accept_shared(&mut self, data: Arc<Vec<Scalar>>) -> Result<(), EvalError> {
        self.ensure_pending()?;
        self.state = match self.descriptor.transport {
            Transport::Collection => State::Collection(data),
            Transport::Stream => State::Stream(Box::new(SharedIter::new(data))),
            Transport::File => {
                State::File(Arc::new(self.write_file(Box::new(SharedIter::new(data)))?))
            }
        };
        Ok(())
    }

    /// Read the content as a sequence.
    pub fn provide_stream(&mut self) -> Result<ScalarStream, EvalError> {
        if matches!(self.state, State::Stream(_)) {
            if let State::Stream(s) = std::mem::replace(&mut self.state, State::Consumed) {
                return Ok(s);
            }
        }
        let stream: ScalarStream = match &self.state {
            State::Pending => return Err(EvalError::NotReady(self.label())),
            State::Consumed | State::Stream(_) => return Err(EvalError::Consumed(self.label())),
            State::Collection(data) => Box::new(SharedIter::new(Arc::clone(data))),
            State::File(file) => Box::new(read_file(&file.path)?.into_iter()),
        };
        if !self.descriptor.reusable {
            self.state = State::Consumed;
        }
        Ok(stream)
    }

    /// Read the content as a materialized vector.
    pub fn provide_collection(&mut self) -> Result<Arc<Vec<Scalar>>, EvalError> {
        if let State::Collection(data) = &self.state {
            let data = Arc::clone(data);
            if !self.descriptor.reusable {
                self.state = State::Consumed;
            }
            return Ok(data);
        }
        Ok(Arc::new(self.provide_stream()?.collect()))
    }

    /// Buffer a lazy stream so that the instance is complete before it is
    /// handed to another execution. Non-stream states are left as they are.
    pub fn materialize(&mut self) -> Result<(), EvalError> {
        match std::mem::replace(&mut self.state, State::Consumed) {
            State::Pending => {
                self.state = State::Pending;
                Err(EvalError::NotReady(self.label()))
            }
            State::Consumed => Err(EvalError::Consumed(self.label())),
            State::Stream(s) => {
                self.state = State::Collection(Arc::new(s.collect()));
                Ok(())
            }
            other => {
                self.state = other;
                Ok(())
            }
        }
    }

    /// Another handle onto the same data. Only written reusable instances
    /// can be shared; the data itself is not copied.
    pub fn share(&self) -> Result<ChannelInstance, EvalError> {
        assert!(
            self.descriptor.reusable,
            "channel {} uses single-consumer descriptor {}",
            self.channel, self.descriptor
        );
        let state = match &self.state {
            State::Pending => return Err(EvalError::NotReady(self.label())),
            State::Consumed | State::Stream(_) => return Err(EvalError::Consumed(self.label())),
            State::Collection(data) => State::Collection(Arc::clone(data)),
            State::File(file) => State::File(Arc::clone(file)),
        };
        Ok(ChannelInstance {
            channel: self.channel,
            descriptor: self.descriptor,
            file_path: self.file_path.clone(),
            state,
        })
    }

    fn ensure_pending(&self) -> Result<(), EvalError> {
        if matches!(self.state, State::Pending) {
            Ok(())
        } else {
            Err(EvalError::AlreadyWritten(self.label()))
        }
    }

    fn write_file(&self, stream: ScalarStream) -> Result<FileData, EvalError> {
        let path = self
            .file_path
            .clone()
            .ok_or_else(|| EvalError::NoFilePath(self.label()))?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let mut w = BufWriter::new(File::create(&path)?);
        let mut len = 0usize;
        for quantum in stream {
            serde_json::to_writer(&mut w, &quantum)?;
            w.write_all(b"\n")?;
            len += 1;
        }
        w.flush()?;
        Ok(FileData { path, len })
    }

    fn label(&self) -> String {
        format!("{}[{}]", self.channel, self.descriptor)
    }
}

impl fmt::Debug for ChannelInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            State::Pending => "pending",
            State::Collection(_) => "collection",
            State::Stream(_) => "stream",
            State::File(_) => "file",
            State::Consumed => "consumed",
        };
        f.debug_struct("ChannelInstance")
            .field("channel", &self.channel)
            .field("descriptor", &self.descriptor.name)
            .field("state", &state)
            .finish()
    }
}

fn read_file(path: &Path) -> Result<Vec<Scalar>, EvalError> {
    let reader = BufReader::new(File::open(path)?);
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        out.push(serde_json::from_str(&line)?);
    }
    Ok(out)
}

/// Owned iteration over a shared vector.
struct SharedIter {
    data: Arc<Vec<Scalar>>,
    pos: usize,
}

impl SharedIter {
    fn new(data: Arc<Vec<Scalar>>) -> Self {
        Self { data, pos: 0 }
    }
}

impl Iterator for SharedIter {
    type Item = Scalar;

    fn next(&mut self) -> Option<Scalar> {
        let item = self.data.get(self.pos).cloned();
        self.pos += 1;
        item
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.data.len().saturating_sub(self.pos);
        (left, Some(left))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polyflow_core::channel::{COLLECTION, FILE, STREAM};

    fn ints(n: i64) -> Vec<Scalar> {
        (0..n).map(Scalar::I64).collect()
    }

    #[test]
    fn stream_is_single_pass() {
        let mut inst = ChannelInstance::new(ChannelId::new(0), STREAM);
        assert!(matches!(inst.provide_stream(), Err(EvalError::NotReady(_))));
        inst.accept_stream(Box::new(ints(3).into_iter())).unwrap();
        assert_eq!(inst.provide_stream().unwrap().count(), 3);
        assert!(matches!(inst.provide_stream(), Err(EvalError::Consumed(_))));
    }

    #[test]
    fn collection_is_reusable_and_shareable() {
        let mut inst = ChannelInstance::new(ChannelId::new(1), COLLECTION);
        inst.accept_stream(Box::new(ints(4).into_iter())).unwrap();
        assert_eq!(inst.len_hint(), Some(4));
        let mut other = inst.share().unwrap();
        assert_eq!(inst.provide_stream().unwrap().count(), 4);
        assert_eq!(inst.provide_collection().unwrap().len(), 4);
        assert_eq!(other.provide_collection().unwrap().as_slice(), ints(4).as_slice());
    }

    #[test]
    fn writing_twice_is_rejected() {
        let mut inst = ChannelInstance::new(ChannelId::new(2), COLLECTION);
        inst.accept_collection(ints(1)).unwrap();
        assert!(matches!(
            inst.accept_collection(ints(1)),
            Err(EvalError::AlreadyWritten(_))
        ));
    }

    #[test]
    fn materialize_buffers_streams() {
        let mut inst = ChannelInstance::new(ChannelId::new(3), STREAM);
        inst.accept_stream(Box::new(ints(5).into_iter())).unwrap();
        assert_eq!(inst.len_hint(), None);
        inst.materialize().unwrap();
        assert_eq!(inst.len_hint(), Some(5));
        assert_eq!(inst.provide_stream().unwrap().count(), 5);
        assert!(inst.is_consumed());
    }

    #[test]
    fn file_round_trips_and_is_removed_with_last_handle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c4.jsonl");
        let mut inst = ChannelInstance::new(ChannelId::new(4), FILE).with_file_path(&path);
        inst.accept_collection(vec![Scalar::from("a"), Scalar::I64(2), Scalar::Null])
            .unwrap();
        assert!(path.exists());

        let mut shared = inst.share().unwrap();
        drop(inst);
        assert!(path.exists());
        let back = shared.provide_collection().unwrap();
        assert_eq!(back.len(), 3);
        assert_eq!(back[0], Scalar::from("a"));
        drop(shared);
        assert!(!path.exists());
    }

    #[test]
    fn file_without_path_fails() {
        let mut inst = ChannelInstance::new(ChannelId::new(5), FILE);
        assert!(matches!(
            inst.accept_collection(ints(1)),
            Err(EvalError::NoFilePath(_))
        ));
    }
}
