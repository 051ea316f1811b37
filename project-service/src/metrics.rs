use anyhow::Result;
use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct ServiceMetrics {
    registry: Registry,
    auth_outcomes: IntCounterVec,
    authorization_denials: IntCounterVec,
}

impl ServiceMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let auth_outcomes = IntCounterVec::new(
            Opts::new(
                "auth_outcomes_total",
                "Count of request authentication outcomes",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(auth_outcomes.clone()))?;

        let authorization_denials = IntCounterVec::new(
            Opts::new(
                "authorization_denials_total",
                "Count of requests refused for missing roles",
            ),
            &["operation"],
        )?;
        registry.register(Box::new(authorization_denials.clone()))?;

        Ok(Self {
            registry,
            auth_outcomes,
            authorization_denials,
        })
    }

    pub fn auth_outcome(&self, outcome: &str) {
        self.auth_outcomes.with_label_values(&[outcome]).inc();
    }

    pub fn authorization_denied(&self, operation: &str) {
        self.authorization_denials.with_label_values(&[operation]).inc();
    }

    pub fn render(&self) -> Result<Response> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            )
            .body(Body::from(buffer))?;
        Ok(response)
    }
}
