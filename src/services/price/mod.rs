//! Live price distribution: fetch, backoff, history and fan-out.

pub mod backoff;
pub mod client;
pub mod error;
pub mod history;
pub mod normalize;
pub mod service;
pub mod sink;
pub mod source;
pub mod subscribers;
pub mod tracker;

pub use backoff::BackoffController;
pub use client::FetchClient;
pub use error::FetchError;
pub use history::HistoryBuffer;
pub use normalize::{normalize, RawQuote, SourceFormat};
pub use service::{PriceService, PriceServiceBuilder};
pub use sink::{HttpPriceSink, PriceSink};
pub use source::{HttpPriceSource, PriceSource};
pub use subscribers::{
    BroadcastReport, ChannelSubscriber, DeliveryOutcome, DeliveryResult, PriceSubscriber,
    SubscriberRegistry, SubscriptionHandle, SubscriptionId,
};
pub use tracker::{PollOutcome, PriceTracker, ServiceState};
