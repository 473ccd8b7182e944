use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::time::Instant;

/// Timing middleware
/// Stamps every HTTP response with `X-Process-Time-Ms`, the wall time spent
/// between request dispatch and handler return, so clients can compare
/// server overhead across the polling and streaming transports.
pub struct Timing;

impl<S, B> Transform<S, ServiceRequest> for Timing
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = TimingMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(TimingMiddleware { service }))
    }
}

pub struct TimingMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for TimingMiddleware<S>
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
        let start = Instant::now();
        let method = req.method().clone();
        let path = req.path().to_string();

        let fut = self.service.call(req);

        Box::pin(async move {
            let mut res = fut.await?;

            let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
            res.headers_mut().insert(
                "X-Process-Time-Ms".parse().unwrap(),
                format!("{:.2}", elapsed_ms).parse().unwrap(),
            );

            // Keep the logs readable: polling clients hammer these paths.
            if !path.starts_with("/poll/") {
                tracing::debug!("{} {} completed in {:.2}ms", method, path, elapsed_ms);
            }

            Ok(res)
        })
    }
}
