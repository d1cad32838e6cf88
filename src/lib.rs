pub mod announcement;
pub mod as_node;
pub mod config;
pub mod engine;
pub mod error;
pub mod feeds;
pub mod graph;
pub mod prefix;
pub mod priority;
pub mod route_validator;
pub mod rov;
pub mod shared;

pub use announcement::{AltAnnotation, Announcement};
pub use as_node::AsNode;
pub use config::SimulationConfig;
pub use engine::{Engine, RovEngine};
pub use error::{FeedError, GraphError};
pub use graph::Graph;
pub use prefix::Prefix;
pub use priority::RelationshipClass;
pub use route_validator::{RouteValidator, ROA};
pub use rov::{RovAsNode, RovPolicy};
pub use shared::{Asn, Relationships, ROARouted, ROAValidity, UNUSED_ASN_FLAG_FOR_BLACKHOLES};
