use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures_util::future::LocalBoxFuture;
use std::{
    future::{ready, Ready},
    time::Instant,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Logs every control API request with a short request id.
pub struct RequestLogging;

impl<S, B> Transform<S, ServiceRequest> for RequestLogging
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestLoggingMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestLoggingMiddleware { service }))
    }
}

pub struct RequestLoggingMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for RequestLoggingMiddleware<S>
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
        let started = Instant::now();
        let request_id = Uuid::new_v4().simple().to_string()[..8].to_string();
        let method = req.method().to_string();
        let path = req.path().to_string();
        let peer = req
            .connection_info()
            .peer_addr()
            .unwrap_or("unknown")
            .to_string();

        debug!(request_id = %request_id, method = %method, path = %path, peer = %peer, "Control request started");

        let fut = self.service.call(req);

        Box::pin(async move {
            let result = fut.await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match &result {
                Ok(response) if response.status().is_success() => {
                    info!(
                        request_id = %request_id,
                        method = %method,
                        path = %path,
                        status = response.status().as_u16(),
                        duration_ms,
                        "Control request completed"
                    );
                }
                Ok(response) => {
                    warn!(
                        request_id = %request_id,
                        method = %method,
                        path = %path,
                        status = response.status().as_u16(),
                        duration_ms,
                        "Control request rejected"
                    );
                }
                Err(err) => {
                    error!(
                        request_id = %request_id,
                        method = %method,
                        path = %path,
                        duration_ms,
                        error = %err,
                        "Control request failed"
                    );
                }
            }

            result
        })
    }
}
