//! Small HTTP server with the trace pipeline mounted.
//!
//! Requests carrying an `x-user-id` header are attributed to that user and
//! written to `<TRACES_TABLE>.jsonl` every `TRACES_PERIOD` seconds.
//!
//! ```text
//! curl -X PUT localhost:8080/projects/1/settings \
//!      -H 'x-user-id: 7' -d '{"apiKey": "secret", "name": "demo"}'
//! ```

use actiontrail::config::load_dotenv;
use actiontrail::{
    pipeline, Identity, JsonLinesSink, TraceBody, TraceConfig, TraceLayer, TraceRoute,
};
use bytes::Bytes;
use http::{Method, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower::{service_fn, ServiceBuilder};

const ROUTES: &[(Method, &str, &str)] = &[
    (Method::GET, "/projects", "list_projects"),
    (Method::POST, "/projects", "create_project"),
    (Method::DELETE, "/projects/{id}", "delete_project"),
    (Method::PUT, "/projects/{id}/settings", "update_settings"),
    (Method::POST, "/{projectId}/sessions/search2", "search_sessions"),
];

/// Match a concrete path against the route templates.
fn resolve(method: &Method, path: &str) -> Option<TraceRoute> {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    ROUTES.iter().find_map(|(m, template, action)| {
        let parts: Vec<&str> = template.trim_matches('/').split('/').collect();
        let matched = m == method
            && parts.len() == segments.len()
            && parts
                .iter()
                .zip(&segments)
                .all(|(p, s)| p.starts_with('{') || p == s);
        matched.then(|| TraceRoute::new(*action, *template))
    })
}

fn annotate(mut req: Request<Incoming>) -> Request<Incoming> {
    if let Some(route) = resolve(req.method(), req.uri().path()) {
        req.extensions_mut().insert(route);
    }
    let user_id = req
        .headers()
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok());
    if let Some(user_id) = user_id {
        req.extensions_mut().insert(Identity::new(user_id));
    }
    req
}

async fn handle(req: Request<TraceBody>) -> Result<Response<Full<Bytes>>, Infallible> {
    let status = match resolve(req.method(), req.uri().path()) {
        Some(route) if route.action == "create_project" => StatusCode::CREATED,
        Some(route) if route.action == "delete_project" => StatusCode::NO_CONTENT,
        Some(_) => StatusCode::OK,
        None => StatusCode::NOT_FOUND,
    };
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    Ok(response)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("actiontrail=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .init();

    let config = TraceConfig::from_env()?;
    let sink = JsonLinesSink::new(format!("{}.jsonl", config.traces_table));
    let (collector, flusher) = pipeline(sink);
    let collector = collector.with_redactor(config.redactor());
    let scheduler = flusher.spawn(config.flush_interval());

    let service = ServiceBuilder::new()
        .map_request(annotate)
        .layer(TraceLayer::new(collector))
        .service(service_fn(handle));

    let addr: SocketAddr = "127.0.0.1:8080".parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, period = config.traces_period, "Traced server running");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _) = accepted?;
                let io = TokioIo::new(stream);
                let service = TowerToHyperService::new(service.clone());
                tokio::spawn(async move {
                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        tracing::error!("Connection error: {}", err);
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    let outcome = scheduler.shutdown().await;
    tracing::info!(?outcome, "Final trace flush");
    Ok(())
}
