//! Load-balancer core: real-selection ring, session table, packet path,
//! and the WLC feedback controller (`spec.md` §4.8-§4.11).

pub mod counters;
pub mod error;
pub mod packet_path;
pub mod ring;
pub mod session;
pub mod wlc;

pub use counters::{TrafficCounterTable, TrafficCounters, WorkerCounters, WorkerCountersSnapshot};
pub use error::{PacketDrop, SessionError};
pub use packet_path::{handle_packet, EncapPlan, PacketMeta, RealRecord, Timeouts, VirtualService};
pub use ring::{free_ring, RealRing, RING_INVALID};
pub use session::{GetOrCreateStatus, SessionHandle, SessionState, SessionTable, BUCKET_WIDTH};
pub use wlc::{recompute_weights, RealSample};
