use crate::state::AppState;
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error,
};
use futures_util::future::LocalBoxFuture;
use std::{
    future::{ready, Ready},
    time::Instant,
};

/// Records request count, error count and per-endpoint latency into [`AppState`].
///
/// Endpoints are keyed by method and route pattern (e.g. `POST /explain`). Requests
/// that match no route share a single `unmatched` bucket so arbitrary paths cannot
/// grow the metrics map.
pub struct MetricsMiddleware;

impl<S, B> Transform<S, ServiceRequest> for MetricsMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = MetricsMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(MetricsMiddlewareService { service }))
    }
}

pub struct MetricsMiddlewareService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for MetricsMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();
        let method = req.method().to_string();
        let route = req.match_pattern().unwrap_or_else(|| "unmatched".to_string());
        let endpoint = format!("{} {}", method, route);

        let app_state = req.app_data::<web::Data<AppState>>().cloned();
        if let Some(app_state) = &app_state {
            app_state.increment_request_count();
        }

        let fut = self.service.call(req);

        Box::pin(async move {
            let result = fut.await;
            let duration_ms = start_time.elapsed().as_millis() as u64;

            let is_error = match &result {
                Ok(response) => response.status().is_client_error() || response.status().is_server_error(),
                Err(_) => true,
            };

            if let Some(app_state) = app_state {
                app_state.record_endpoint_request(&endpoint, duration_ms, is_error);
                if is_error {
                    app_state.increment_error_count();
                }
            }

            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::state_with;
    use crate::simplifier::testing::StubClient;
    use actix_web::{test, App};
    use serde_json::json;
    use std::sync::Arc;

    #[actix_web::test]
    async fn test_records_routes_and_errors() {
        let state = state_with(Arc::new(StubClient::new()));
        let limit = state.config.server.json_limit_bytes;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .wrap(MetricsMiddleware)
                .configure(|cfg| crate::handlers::configure(cfg, limit)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/explain")
            .set_json(json!({ "term": "gravity" }))
            .to_request();
        test::call_service(&app, req).await;

        let req = test::TestRequest::post()
            .uri("/explain")
            .set_json(json!({ "term": "" }))
            .to_request();
        test::call_service(&app, req).await;

        let req = test::TestRequest::get().uri("/no/such/route/1").to_request();
        test::call_service(&app, req).await;

        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.request_count, 3);
        assert_eq!(snapshot.error_count, 2);

        let explain = &snapshot.endpoint_metrics["POST /explain"];
        assert_eq!(explain.request_count, 2);
        assert_eq!(explain.error_count, 1);
        assert!(snapshot.endpoint_metrics.keys().all(|key| !key.contains("/no/such")));
    }
}
