use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, response::Json, routing::get, routing::post, Router};
use axum_server::tls_rustls::RustlsConfig;
use greptimedb_cluster::api::v1alpha1::greptimedbcluster::GreptimeDBCluster;
use greptimedb_cluster::util::k8s::KubePlatformClient;
use greptimedb_cluster::util::telemetry;
use kube::core::{admission::AdmissionReview, DynamicObject};
use kube::Client;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

mod validator;

use validator::ClusterValidator;

const HEALTH_ADDR: &str = "0.0.0.0:8080";
const WEBHOOK_ADDR: &str = "0.0.0.0:8443";
const TLS_CERT_PATH: &str = "/etc/certs/tls.crt";
const TLS_KEY_PATH: &str = "/etc/certs/tls.key";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::CryptoProvider::install_default(rustls::crypto::aws_lc_rs::default_provider()).ok();
    telemetry::init();

    info!("Starting GreptimeDBCluster admission webhook");

    let client = Client::try_default().await?;
    let validator = Arc::new(ClusterValidator::new(Arc::new(KubePlatformClient::new(client))));

    let app = Router::new()
        .route("/validate", post(validate_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(validator);

    tokio::spawn(async {
        let health_app = Router::new().route("/health", get(health_handler));
        match tokio::net::TcpListener::bind(HEALTH_ADDR).await {
            Ok(listener) => {
                info!("Health server listening on {}", HEALTH_ADDR);
                if let Err(e) = axum::serve(listener, health_app).await {
                    error!("health server failed: {}", e);
                }
            }
            Err(e) => error!("failed to bind {}: {}", HEALTH_ADDR, e),
        }
    });

    let tls_config = RustlsConfig::from_pem_file(TLS_CERT_PATH, TLS_KEY_PATH).await?;
    let addr: SocketAddr = WEBHOOK_ADDR.parse()?;

    info!("Admission webhook listening on {} (HTTPS)", WEBHOOK_ADDR);
    axum_server::bind_rustls(addr, tls_config)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}

async fn validate_handler(
    State(validator): State<Arc<ClusterValidator>>,
    Json(review): Json<AdmissionReview<GreptimeDBCluster>>,
) -> Json<AdmissionReview<DynamicObject>> {
    Json(validator.review(review).await)
}

async fn health_handler() -> &'static str {
    "healthy"
}
