//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{
    Counter, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Once;

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Metrics
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "tweetapp_http_request_duration_seconds",
            "HTTP request duration in seconds"
        ).buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["method", "endpoint"]
    ).expect("metric can be created");

    // Engagement Metrics
    pub static ref ENGAGEMENT_EVENTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("tweetapp_engagement_events_total", "Total number of engagement toggles and comments"),
        &["kind", "state"]
    ).expect("metric can be created");
    pub static ref NOTIFICATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("tweetapp_notifications_total", "Total number of notifications created"),
        &["kind"]
    ).expect("metric can be created");
    pub static ref POSTS_CREATED_TOTAL: IntCounter = IntCounter::new(
        "tweetapp_posts_created_total",
        "Total number of posts created"
    ).expect("metric can be created");
    pub static ref REGISTRATIONS_TOTAL: IntCounter = IntCounter::new(
        "tweetapp_registrations_total",
        "Total number of registered accounts"
    ).expect("metric can be created");

    // Storage Metrics
    pub static ref MEDIA_UPLOADS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("tweetapp_media_uploads_total", "Total number of media uploads"),
        &["kind"]
    ).expect("metric can be created");
    pub static ref MEDIA_BYTES_UPLOADED: Counter = Counter::new(
        "tweetapp_media_bytes_uploaded_total",
        "Total bytes of media uploaded"
    ).expect("metric can be created");

    // SMS Metrics
    pub static ref OTP_DELIVERIES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("tweetapp_otp_deliveries_total", "Total number of OTP delivery attempts"),
        &["status"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("tweetapp_errors_total", "Total number of errors"),
        &["error_type"]
    ).expect("metric can be created");
}

static INIT: Once = Once::new();

/// Initialize metrics registry.
///
/// Safe to call more than once; registration happens on the first call only.
pub fn init_metrics() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()))
            .expect("HTTP_REQUEST_DURATION_SECONDS can be registered");
        REGISTRY
            .register(Box::new(ENGAGEMENT_EVENTS_TOTAL.clone()))
            .expect("ENGAGEMENT_EVENTS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(NOTIFICATIONS_TOTAL.clone()))
            .expect("NOTIFICATIONS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(POSTS_CREATED_TOTAL.clone()))
            .expect("POSTS_CREATED_TOTAL can be registered");
        REGISTRY
            .register(Box::new(REGISTRATIONS_TOTAL.clone()))
            .expect("REGISTRATIONS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(MEDIA_UPLOADS_TOTAL.clone()))
            .expect("MEDIA_UPLOADS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(MEDIA_BYTES_UPLOADED.clone()))
            .expect("MEDIA_BYTES_UPLOADED can be registered");
        REGISTRY
            .register(Box::new(OTP_DELIVERIES_TOTAL.clone()))
            .expect("OTP_DELIVERIES_TOTAL can be registered");
        REGISTRY
            .register(Box::new(ERRORS_TOTAL.clone()))
            .expect("ERRORS_TOTAL can be registered");

        tracing::info!("Metrics registry initialized");
    });
}

/// Encode every registered metric in the Prometheus text format.
pub fn render() -> Result<String, prometheus::Error> {
    TextEncoder::new().encode_to_string(&REGISTRY.gather())
}
