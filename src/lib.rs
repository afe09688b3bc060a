pub mod align;
pub mod audio;
pub mod cancel;
pub mod chunks;
pub mod config;
pub mod error;
pub mod estimate;
pub mod orchestrator;
pub mod script;
pub mod subtitle;
pub mod timeline;
pub mod transcribe;
pub mod validate;

pub use align::SequenceAligner;
pub use audio::{AudioAsset, DurationProbe, MediaProbe};
pub use cancel::CancelToken;
pub use chunks::ChunkTimer;
pub use config::Config;
pub use error::{Result, SyncError};
pub use estimate::TimingEstimator;
pub use orchestrator::{
    print_summary, AttemptOutcome, SyncJob, SyncReport, TierAttempt, TierOrchestrator, TierPolicy,
};
pub use script::{Script, SpeakerId, Utterance};
pub use timeline::{Segment, SegmentOrigin, TierId, Timeline, TimelineDocument, TimelineRecord};
pub use transcribe::{TranscribedWord, Transcriber};
pub use validate::{Rejection, ValidationGate};
