//! Prometheus recorder and the HTTP endpoint that exposes it.
//!
//! One recorder per process. Binaries call [`init_global`] once at startup;
//! tests call [`init_test`], which installs a recorder on first use and
//! returns the same controller afterwards.

use std::net::SocketAddr;
use std::sync::OnceLock;

use axum::extract::State;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use snafu::prelude::*;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::error::{
    AddressParseSnafu, AlreadyInitializedSnafu, MetricsError, NotInitializedSnafu,
    PrometheusInitSnafu,
};

/// Default metrics address.
pub const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:9090";

/// Bucket bounds, in seconds, for pipeline and call durations.
const DURATION_BUCKETS: &[f64] = &[0.05, 0.25, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 3600.0];

static CONTROLLER: OnceLock<MetricsController> = OnceLock::new();

/// Handle to the process-wide recorder.
pub struct MetricsController {
    handle: PrometheusHandle,
}

impl MetricsController {
    /// The installed controller.
    pub fn get() -> Result<&'static Self, MetricsError> {
        CONTROLLER.get().context(NotInitializedSnafu)
    }

    /// Current metrics in the Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }

    fn install() -> Result<&'static Self, MetricsError> {
        ensure!(CONTROLLER.get().is_none(), AlreadyInitializedSnafu);

        let handle = PrometheusBuilder::new()
            .set_buckets(DURATION_BUCKETS)
            .context(PrometheusInitSnafu)?
            .install_recorder()
            .context(PrometheusInitSnafu)?;

        CONTROLLER
            .set(Self { handle })
            .map_err(|_| AlreadyInitializedSnafu.build())?;
        Self::get()
    }
}

/// Install the recorder and serve it on `address`.
///
/// Must be called from within a tokio runtime. Binding happens in the
/// background; a bind failure is logged, not returned.
pub fn init_global(address: &str) -> Result<(), MetricsError> {
    let addr: SocketAddr = address.parse().context(AddressParseSnafu)?;
    let controller = MetricsController::install()?;

    tokio::spawn(serve(addr, router(controller.handle.clone())));
    info!(%addr, "Metrics endpoint enabled");
    Ok(())
}

/// Install a recorder without an endpoint, once.
pub fn init_test() -> &'static MetricsController {
    CONTROLLER.get_or_init(|| {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        // Another recorder may already own the global slot
        let _ = metrics::set_global_recorder(recorder);
        MetricsController { handle }
    })
}

fn router(handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .route("/health", get(|| async { "ok\n" }))
        .with_state(handle)
}

async fn render_metrics(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}

async fn serve(addr: SocketAddr, app: Router) {
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, error = %e, "Failed to bind metrics endpoint");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        error!(%addr, error = %e, "Metrics endpoint stopped");
    }
}
