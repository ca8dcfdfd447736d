//! GitHub API access: the quota-guarded client and its wire types.

pub mod client;
pub mod types;
