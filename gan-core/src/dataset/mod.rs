// gan-core/src/dataset/mod.rs

//! Dataset registry, record formats, worker sharding and paired input pipelines.

pub mod format;
pub mod pipeline;
pub mod reader;
pub mod registry;
pub mod sharding;

pub use format::{FixedSizeFormat, LengthPrefixedFormat, RecordFormat};
pub use pipeline::{Fetch, InputPipeline, InputSource, InputSpec, PairedBatch, PairedDataset};
pub use reader::ShardReader;
pub use registry::{Dataset, DatasetInfo, DatasetRegistry, RecordEncoding, DEFAULT_DATASET};
pub use sharding::{calculate_shards, ShardSpec};
