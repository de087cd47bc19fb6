pub mod monitor;
pub mod providers;

pub use monitor::{VpnMonitor, VpnStatus};
pub use providers::{GeoLookup, GeoProvider};
