pub mod capture_manager;
pub mod extractor;
pub mod packet_source;
pub mod pipeline;

pub use capture_manager::{
    CaptureManager, CaptureState, CaptureStatus, LoopExit, RestartPolicy, StopOutcome, StopSignal,
};
pub use extractor::{extract, extract_at, Extraction, Observation, RejectReason};
pub use packet_source::{
    ChannelSourceFactory, PacketFeed, PacketSource, PacketSourceFactory, PnetSourceFactory,
    RawPacket, SourceEvent, DNS_PORT,
};
pub use pipeline::EntryPipeline;
