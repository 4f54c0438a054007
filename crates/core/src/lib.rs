pub mod account;
pub mod clock;
pub mod config;
pub mod config_loader;
pub mod instrument;
pub mod traits;

pub use account::AccountRiskState;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, CacheConfig, GateConfig, PaperConfig, RiskConfig, StrategyConfig};
pub use config_loader::ConfigLoader;
pub use instrument::{Greeks, InstrumentRecord, OptionRight, RecordError};
pub use traits::{AccountSource, MarketFeed};
