use actix_web::{get, middleware, web::Data, App, HttpRequest, HttpResponse, Responder};
use clap::Parser;
use greptimedb_cluster::config::OperatorOptions;
use greptimedb_cluster::controllers::cluster_controller::{self, State};
use greptimedb_cluster::util::telemetry;
use prometheus::{Encoder, TextEncoder};
use tracing::{error, info};

mod options;

#[get("/metrics")]
async fn metrics(c: Data<State>, _req: HttpRequest) -> impl Responder {
    let metrics = c.metrics();
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    match encoder.encode(&metrics, &mut buffer) {
        Ok(()) => HttpResponse::Ok().content_type(encoder.format_type()).body(buffer),
        Err(e) => {
            error!("failed to encode metrics: {}", e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[get("/health")]
async fn health(_: HttpRequest) -> impl Responder {
    HttpResponse::Ok().json("healthy")
}

#[get("/")]
async fn index(c: Data<State>, _req: HttpRequest) -> impl Responder {
    let d = c.diagnostics().await;
    HttpResponse::Ok().json(&d)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();

    let options: OperatorOptions = options::Cli::parse().into();
    info!("Starting greptimedb operator with {:?}", options);

    // Initialize Kubernetes controller state
    let state = State::default();
    let controller = cluster_controller::run(state.clone(), options.controller_options());

    // Start web server
    let server = actix_web::HttpServer::new(move || {
        App::new()
            .app_data(Data::new(state.clone()))
            .wrap(middleware::Logger::default().exclude("/health"))
            .service(index)
            .service(health)
            .service(metrics)
    })
    .bind(&options.metrics_bind_address)?
    .shutdown_timeout(5);

    // Both runtimes implement graceful shutdown, so poll until both are done
    let (controller, server) = tokio::join!(controller, server.run());
    controller?;
    server?;
    Ok(())
}
