//! Session bounded context - per-participant negotiation and the registry that owns it

pub mod peer_session;
pub mod registry;
pub mod value_object;

pub use peer_session::{CandidateDisposition, PeerSession, SessionOp};
pub use registry::PeerRegistry;
pub use value_object::{IceCandidate, NegotiationRole, NegotiationState, SdpKind, SessionDescription};
