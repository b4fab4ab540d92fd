pub mod blocklist;
pub mod flow;
pub mod policy;

pub use blocklist::Blocklist;
pub use flow::{FlowKey, FlowPolicy, FlowTracker};
pub use policy::{Decision, DecisionPolicy, DropReason, Verdict};
