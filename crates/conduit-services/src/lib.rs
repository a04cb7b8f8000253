//! conduit-services — the bridge router and the collaborator seams it talks
//! through: broker links and the route store.

pub mod bridge;
pub mod link;
pub mod local_link;
pub mod route_store;
pub mod stats;

pub use bridge::{BridgeRouter, Outcome, RelayError, RelayReport, RelaySettings, RouterStatus};
pub use link::{BrokerLink, LinkError, LinkSide, LinkState, Qos, TransportLogLevel};
pub use local_link::{LocalLink, Published};
pub use route_store::{
    now_millis, MemoryRouteStore, RouteState, RouteStore, SqliteRouteStore, StoreError,
};
pub use stats::{RelayStats, StatsSnapshot};
