pub mod annotations;
pub mod clock;
pub mod config;
pub mod error;
pub mod health;
pub mod inventory;
pub mod resources;
pub mod suspender;
pub mod watcher;

pub use annotations::{AnnotationKeys, DesiredState};
pub use clock::Clock;
pub use config::Options;
pub use error::{Error, Result};
pub use health::{run_health_server, run_uptime_counter, HealthState};
pub use inventory::{Inventory, KubeInventory};
pub use suspender::Suspender;
pub use watcher::{run_watcher, QUEUE_CAPACITY};
