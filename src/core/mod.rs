pub mod classify;
pub mod export;
pub mod harvester;
pub mod join;
pub mod metrics;
pub mod normalize;
pub mod report;
pub mod resolver;

pub use crate::domain::model::{
    ChannelMetrics, FunnelInput, FunnelSnapshot, HarvestResult, Identity, JoinedIdentitySet,
    RawRecord, SourceKind, TimeRange,
};
pub use crate::domain::ports::{Clock, LookupQuery, ReportQuery, Sleeper, Storage};
pub use crate::utils::error::Result;
