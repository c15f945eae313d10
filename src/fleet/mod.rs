//! Fleet Data
//!
//! Everything the dashboards know about the update platform:
//!
//! - **types**: deployments, devices and their statuses
//! - **api**: the [`FleetApi`] fetch collaborator trait
//! - **store**: [`FleetStore`] application state and [`FleetActions`]
//! - **simulated**: [`SimulatedFleet`], an in-process backend
//! - **error**: [`FetchError`]

pub mod api;
pub mod error;
pub mod simulated;
pub mod store;
pub mod types;

pub use api::FleetApi;
pub use error::{FetchError, FetchResult};
pub use simulated::SimulatedFleet;
pub use store::{FleetActions, FleetStore, DEFAULT_DEPLOYMENT_DEVICE_LIMIT};
pub use types::{
    Deployment, DeploymentPage, DeploymentStats, DeploymentStatus, Device, DevicePage,
    DeviceStatus,
};
