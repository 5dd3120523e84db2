use std::sync::Arc;

use greptimedb_cluster::api::v1alpha1::greptimedbcluster::GreptimeDBCluster;
use greptimedb_cluster::util::k8s::PlatformClient;
use greptimedb_cluster::validation::{check::check_cluster, check::CheckError, Validate, ValidationError};
use kube::core::{
    admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation},
    DynamicObject,
};
use kube::ResourceExt;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("missing object in {0:?} request")]
    MissingObject(Operation),

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Check(#[from] CheckError),
}

/// Admits a `GreptimeDBCluster` only if its spec is well-formed and everything it references exists.
pub struct ClusterValidator {
    platform: Arc<dyn PlatformClient>,
}

impl ClusterValidator {
    pub fn new(platform: Arc<dyn PlatformClient>) -> Self {
        Self { platform }
    }

    pub async fn review(&self, review: AdmissionReview<GreptimeDBCluster>) -> AdmissionReview<DynamicObject> {
        let request: AdmissionRequest<GreptimeDBCluster> = match review.try_into() {
            Ok(request) => request,
            Err(e) => {
                warn!("invalid admission review: {}", e);
                return AdmissionResponse::invalid(e.to_string()).into_review();
            }
        };

        let response = AdmissionResponse::from(&request);
        match self.validate_request(&request).await {
            Ok(()) => response.into_review(),
            Err(e) => {
                info!("Denied {:?} of GreptimeDBCluster '{}': {}", request.operation, request.name, e);
                response.deny(e.to_string()).into_review()
            }
        }
    }

    async fn validate_request(&self, request: &AdmissionRequest<GreptimeDBCluster>) -> Result<(), ReviewError> {
        match request.operation {
            Operation::Create | Operation::Update => {
                let cluster = request
                    .object
                    .as_ref()
                    .ok_or(ReviewError::MissingObject(request.operation.clone()))?;
                self.validate_cluster(cluster).await
            }
            _ => Ok(()),
        }
    }

    pub async fn validate_cluster(&self, cluster: &GreptimeDBCluster) -> Result<(), ReviewError> {
        debug!("Validating GreptimeDBCluster '{}'", cluster.name_any());
        cluster.validate()?;
        check_cluster(cluster, self.platform.as_ref()).await?;
        Ok(())
    }
}
