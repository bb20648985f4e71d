//! gRPC service implementations for xDS.
//!
//! Only the Aggregated Discovery Service is served: every resource kind
//! travels over one ADS stream, in either protocol flavour.

pub mod ads;

pub use ads::{
    AdsResponseStream, AdsService, AggregatedDiscoveryService, AggregatedDiscoveryServiceServer,
    DeltaAdsResponseStream,
};
