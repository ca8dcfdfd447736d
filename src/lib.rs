//! Keep a preview-deployment workflow in sync with pull request state.
//!
//! Two modes: `synchronize` reconciles preview labels, mirror refs, and
//! deployments against recently updated pull requests; `detect` waits for a
//! triggered deployment to come online and reports the outcome back to
//! GitHub as a deployment status.
//!
//! The service provided by this tool is not critical, but it shares a
//! GitHub API request quota with critical services. For this reason, every
//! API request is preceded by a guard which verifies that the request will
//! not deplete the shared quota. In effect, the tool fails rather than
//! interfere with the operations of critical services.

pub mod detect;
pub mod error;
pub mod github;
pub mod remote;
pub mod sync;
