pub mod cache;
pub mod engine;
pub mod features;
pub mod grouper;
pub mod hasher;
pub mod mode;
pub mod perceptual;
pub mod pool;
pub mod prefilter;
pub mod qr;
pub mod results;

pub use cache::FeatureCache;
pub use engine::{CacheSet, Engine};
pub use features::{FeatureExtractor, FeatureRecord, FeatureRequest, FeatureStatus, QrPolicy};
pub use grouper::{match_features, Group, GroupKind, GroupMember, MatchOptions, MatchOutcome, SkippedImage};
pub use mode::{AdLibraryUse, BuiltinStrategy, ComparisonStrategy};
pub use perceptual::PerceptualHash;
pub use pool::{CancelFlag, WorkerPool};
pub use qr::{QrDetector, QrResult, RqrrDetector};
pub use results::RunReport;
