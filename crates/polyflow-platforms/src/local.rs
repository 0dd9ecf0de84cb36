//! The `local` platform: everything runs in the calling process.
//!
//! Element-wise operators prefer lazy streams so adjacent tasks fuse without
//! buffering. Shuffles read collections when they can, since they buffer
//! their whole input anyway.

use polyflow_core::prelude::{ChannelDescriptor, Configuration, Transport, COLLECTION, FILE, STREAM};
use polyflow_exec::PushExecutorFactory;
use polyflow_plan::operator::{conversion_load_key, load_key};
use polyflow_plan::{ChannelSupport, ExecutorFactory, OperatorKind, Platform};

pub const NAME: &str = "local";

/// Load specifications installed by `configure_defaults`.
const DEFAULT_LOADS: [(&str, &str); 11] = [
    ("collection-source", "cpu = 10 + out0"),
    ("text-file-source", "cpu = 10 + 2*out0; disk = 20*out0"),
    ("map", "cpu = 2*in0"),
    ("filter", "cpu = 2*in0"),
    ("flat-map", "cpu = 2*in0 + out0"),
    ("union-all", "cpu = in0 + in1"),
    ("distinct", "cpu = 5*in0; ram = in0"),
    ("count", "cpu = in0"),
    ("sort", "cpu = 8*in0; ram = in0"),
    ("collect-sink", "cpu = in0; ram = in0"),
    ("convert", "cpu = in0; ram = in0"),
];

/// Conversions touching disk pay for every quantum written or read.
const FILE_CONVERSION_LOAD: &str = "cpu = in0; disk = 20*in0";

#[derive(Debug)]
pub struct LocalPlatform {
    factory: PushExecutorFactory,
}

impl LocalPlatform {
    pub fn new() -> Self {
        Self {
            factory: PushExecutorFactory::new(NAME),
        }
    }
}

impl Default for LocalPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for LocalPlatform {
    fn name(&self) -> &str {
        NAME
    }

    fn configure_defaults(&self, cfg: &mut Configuration) {
        for (operator, spec) in DEFAULT_LOADS {
            cfg.set_default(load_key(NAME, operator), spec);
        }
        for (from, to) in self.conversions() {
            if from.transport == Transport::File || to.transport == Transport::File {
                cfg.set_default(conversion_load_key(NAME, &from, &to), FILE_CONVERSION_LOAD);
            }
        }
    }

    fn executor_factory(&self) -> &dyn ExecutorFactory {
        &self.factory
    }

    fn channel_support(&self, kind: &OperatorKind) -> Option<ChannelSupport> {
        let lazy = [STREAM, COLLECTION];
        let buffered = [COLLECTION, STREAM];
        let support = match kind {
            OperatorKind::CollectionSource { .. }
            | OperatorKind::TextFileSource { .. }
            | OperatorKind::Map { .. }
            | OperatorKind::Filter { .. }
            | OperatorKind::FlatMap { .. }
            | OperatorKind::CollectSink { .. } => ChannelSupport::uniform(kind, &lazy, &lazy),
            OperatorKind::UnionAll => ChannelSupport::uniform(kind, &buffered, &[STREAM]),
            OperatorKind::Distinct | OperatorKind::Sort => {
                ChannelSupport::uniform(kind, &buffered, &buffered)
            }
            OperatorKind::Count => ChannelSupport::uniform(kind, &buffered, &[COLLECTION]),
            // Conversions are declared through `conversions`.
            OperatorKind::Convert => return None,
        };
        Some(support)
    }

    fn conversions(&self) -> Vec<(ChannelDescriptor, ChannelDescriptor)> {
        vec![
            (STREAM, COLLECTION),
            (COLLECTION, STREAM),
            (STREAM, FILE),
            (COLLECTION, FILE),
            (FILE, COLLECTION),
            (FILE, STREAM),
        ]
    }
}
