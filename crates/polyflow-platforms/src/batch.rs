//! The `batch` platform: a partitioned engine, simulated in process.
//!
//! Data moves between tasks as datasets. A shuffle consumer (`distinct`,
//! `count`, `sort`) starts a new stage, so it never fuses with its producer.
//! CPU work spreads over `polyflow.batch.partitions`; network work does not,
//! and every plan touching the platform pays a start-up cost.

use polyflow_core::prelude::{ChannelDescriptor, Configuration, Transport, COLLECTION, FILE};
use polyflow_cost::{CostError, LoadProfileToTimeConverter, LoadToTimeConverter, Resource};
use polyflow_exec::PushExecutorFactory;
use polyflow_plan::operator::load_key;
use polyflow_plan::platform::check_fusion_preconditions;
use polyflow_plan::{
    Channel, ChannelSupport, ExecutionTask, ExecutorFactory, OperatorKind, PlanError, Platform,
};
use tracing::{debug, warn};

pub const NAME: &str = "batch";

pub const PARTITIONS_KEY: &str = "polyflow.batch.partitions";
pub const INIT_MS_KEY: &str = "polyflow.batch.init.ms";

const DEFAULT_PARTITIONS: u64 = 8;
const DEFAULT_INIT_MS: u64 = 1500;

/// Partitioned in-memory dataset.
pub const DATASET: ChannelDescriptor =
    ChannelDescriptor::new("dataset", Transport::Collection, true, true);

const DEFAULT_LOADS: [(&str, &str); 11] = [
    ("collection-source", "cpu = 100 + out0; net = out0"),
    ("text-file-source", "cpu = 100 + 2*out0; disk = 20*out0"),
    ("map", "cpu = 2*in0"),
    ("filter", "cpu = 2*in0"),
    ("flat-map", "cpu = 2*in0 + out0"),
    ("union-all", "cpu = in0 + in1"),
    ("distinct", "cpu = 5*in0; net = in0"),
    ("count", "cpu = in0; net = 1"),
    ("sort", "cpu = 8*in0; net = in0"),
    ("collect-sink", "cpu = in0; net = in0"),
    ("convert", "cpu = in0; net = in0"),
];

#[derive(Debug)]
pub struct BatchPlatform {
    factory: PushExecutorFactory,
}

impl BatchPlatform {
    pub fn new() -> Self {
        Self {
            factory: PushExecutorFactory::new(NAME),
        }
    }
}

impl Default for BatchPlatform {
    fn default() -> Self {
        Self::new()
    }
}

fn partitions(cfg: &Configuration) -> polyflow_core::prelude::Result<u64> {
    Ok(cfg.get_u64_or(PARTITIONS_KEY, DEFAULT_PARTITIONS)?.max(1))
}

impl Platform for BatchPlatform {
    fn name(&self) -> &str {
        NAME
    }

    fn configure_defaults(&self, cfg: &mut Configuration) {
        for (operator, spec) in DEFAULT_LOADS {
            cfg.set_default(load_key(NAME, operator), spec);
        }
        cfg.set_default("polyflow.batch.network.ms-per-unit", "0.2");
        cfg.set_default("polyflow.batch.overhead.ms", "2");
    }

    fn executor_factory(&self) -> &dyn ExecutorFactory {
        &self.factory
    }

    fn channel_support(&self, kind: &OperatorKind) -> Option<ChannelSupport> {
        match kind {
            OperatorKind::Convert => None,
            _ => Some(ChannelSupport::uniform(kind, &[DATASET], &[DATASET])),
        }
    }

    fn conversions(&self) -> Vec<(ChannelDescriptor, ChannelDescriptor)> {
        vec![
            (DATASET, COLLECTION),
            (COLLECTION, DATASET),
            (DATASET, FILE),
            (FILE, DATASET),
        ]
    }

    fn is_single_platform_execution_possible(
        &self,
        producer: &ExecutionTask,
        channel: &Channel,
        consumer: &ExecutionTask,
    ) -> bool {
        check_fusion_preconditions(NAME, producer, channel, consumer);
        !consumer.operator.kind().is_shuffle()
    }

    fn create_load_profile_to_time_converter(
        &self,
        cfg: &Configuration,
    ) -> Result<LoadProfileToTimeConverter, CostError> {
        let mut converter = LoadProfileToTimeConverter::from_configuration(NAME, cfg)?;
        let partitions = partitions(cfg)? as f64;
        // The start-up estimate is cost configuration too.
        cfg.get_u64(INIT_MS_KEY)?;
        if let Some(cpu) = converter.resources.get(&Resource::Cpu).copied() {
            converter = converter.with_resource(
                Resource::Cpu,
                LoadToTimeConverter::linear(cpu.ms_per_unit / partitions),
            );
        }
        Ok(converter)
    }

    fn warm_up(&self, cfg: &Configuration) -> Result<(), PlanError> {
        let partitions = partitions(cfg).map_err(|e| PlanError::WarmUp {
            platform: NAME.to_string(),
            reason: e.to_string(),
        })?;
        debug!(partitions, "batch platform warmed up");
        Ok(())
    }

    fn initialize_millis(&self, cfg: &Configuration) -> u64 {
        match cfg.get_u64_or(INIT_MS_KEY, DEFAULT_INIT_MS) {
            Ok(ms) => ms,
            Err(e) => {
                warn!(key = INIT_MS_KEY, error = %e, default = DEFAULT_INIT_MS, "malformed start-up estimate");
                DEFAULT_INIT_MS
            }
        }
    }
}
