/// Time-advance bus interface and an in-memory scripted bus.
pub mod bus;
/// Period deadlines and wall clock.
pub mod clock;
/// Parsing of external measurement strings.
pub mod ingest;
pub mod kpi;
/// Phased market loop.
pub mod scheduler;
pub mod synthetic;
pub mod types;

pub use bus::{CoSimBus, PubValue, Publication, ScriptedBus};
pub use clock::{Phase, PhaseDeadlines, SimClock};
pub use kpi::MarketKpi;
pub use scheduler::PeriodScheduler;
pub use synthetic::SyntheticBus;
pub use types::{AgentMetric, AggregateMetric, MarketMetric, MetricsLog, SimConfig};
