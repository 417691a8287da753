//! # Remote Endpoint Client
//!
//! Authenticated HTTP access to remote content-management instances: the
//! package-manager command surface (upload/install/activate/delete/list),
//! repository node read/write used for step markers, and health probes used
//! by the await primitives.
//!
//! One [`ClientPool`] is shared per provisioning run; it hands out cached
//! per-instance [`InstanceClient`]s over a single connection pool.

pub mod http;
pub mod pool;
pub mod responses;

pub use http::{ClientError, InstanceClient, PACKAGE_LIST_PATH, PACKAGE_SERVICE_PATH};
pub use pool::ClientPool;
pub use responses::{
    DeleteResponse, InstallResponse, InstallStatus, ListResponse, PackageDescriptor, UploadResponse,
};
