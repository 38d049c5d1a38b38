//! Config sources, bucket handles and the topology controller.

mod bucket;
mod config_source;
mod controller;
mod protocol_source;
mod streaming_source;

pub use bucket::{BucketHandle, BucketKind, BucketState, TopologyEvent};
pub use config_source::{
    build_config_sources, ConfigCollaborators, ConfigFetcher, ConfigObserver, ConfigSource,
    ConfigSourceKind, ConfigStreamer, RefCountable,
};
pub use controller::TopologyController;
pub use protocol_source::ProtocolConfigSource;
pub use streaming_source::HttpStreamingConfigSource;
