//! Rejects browser requests to the control API that come from a non-local page.
//!
//! A request passes when its `Origin` (or, without one, its `Referer`) is absent
//! or points at localhost / 127.0.0.1 / ::1 on the control port. Anything else
//! gets 403 before reaching a handler.

use crate::error::AppError;
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header, Error,
};
use futures_util::future::LocalBoxFuture;
use std::future::{ready, Ready};
use tracing::warn;
use url::Url;

const LOCAL_HOSTS: [&str; 3] = ["localhost", "127.0.0.1", "::1"];

pub struct LocalOriginGuard {
    port: u16,
}

impl LocalOriginGuard {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

impl<S, B> Transform<S, ServiceRequest> for LocalOriginGuard
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = LocalOriginGuardService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(LocalOriginGuardService {
            service,
            port: self.port,
        }))
    }
}

pub struct LocalOriginGuardService<S> {
    service: S,
    port: u16,
}

impl<S, B> Service<ServiceRequest> for LocalOriginGuardService<S>
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
        let origin = header_value(&req, header::ORIGIN);
        let referer = header_value(&req, header::REFERER);

        if !is_local_request(origin.as_deref(), referer.as_deref(), self.port) {
            warn!(
                uri = %req.uri(),
                origin = ?origin,
                referer = ?referer,
                "Rejected non-local control request"
            );
            let err: Error =
                AppError::Forbidden("request must come from a local page".to_string()).into();
            return Box::pin(async move { Err::<ServiceResponse<B>, Error>(err) });
        }

        let fut = self.service.call(req);
        Box::pin(fut)
    }
}

fn header_value(req: &ServiceRequest, name: header::HeaderName) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// `Origin` decides when present; `Referer` is only consulted without one.
pub fn is_local_request(origin: Option<&str>, referer: Option<&str>, port: u16) -> bool {
    match origin.filter(|o| !o.is_empty()) {
        Some(origin) => is_local_url(origin, port),
        None => referer
            .filter(|r| !r.is_empty())
            .map_or(true, |referer| is_local_url(referer, port)),
    }
}

fn is_local_url(value: &str, port: u16) -> bool {
    let Ok(url) = Url::parse(value) else {
        return false;
    };
    let Some(host) = url.host_str() else {
        return false;
    };

    let host = host.trim_start_matches('[').trim_end_matches(']');
    // A URL without an explicit port is taken to mean the control port
    LOCAL_HOSTS.contains(&host)
        && written_port(value).map_or(true, |written| written.parse::<u16>() == Ok(port))
}

/// Port as written in the URL's authority. `Url::port` reports `None` for a
/// port equal to the scheme default, so `http://localhost:80` needs this.
fn written_port(value: &str) -> Option<&str> {
    let (_, rest) = value.split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, hp)| hp);
    let after_host = match host_port.rfind(']') {
        Some(end) => &host_port[end + 1..],
        None => host_port,
    };
    after_host
        .rsplit_once(':')
        .map(|(_, port)| port)
        .filter(|port| !port.is_empty())
}
