use crate::handlers::response::ApiResponse;
use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpResponse,
};
use futures_util::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::rc::Rc;
use subtle::ConstantTimeEq;

pub const ACCESS_KEY_HEADER: &str = "X-Access-Key";

const GUARDED_PREFIX: &str = "/chat/";

/// Optional deployment-wide key in front of the chat endpoints.
///
/// With no key configured every request passes. Health and metrics are never
/// guarded so probes keep working.
pub struct AccessKey {
    key: Option<Rc<str>>,
}

impl AccessKey {
    pub fn new(key: Option<String>) -> Self {
        Self {
            key: key.map(Rc::from),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AccessKey
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = AccessKeyService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AccessKeyService {
            service,
            key: self.key.clone(),
        }))
    }
}

pub struct AccessKeyService<S> {
    service: S,
    key: Option<Rc<str>>,
}

impl<S> AccessKeyService<S> {
    fn admits(&self, req: &ServiceRequest) -> bool {
        let Some(expected) = self.key.as_deref() else {
            return true;
        };
        if !req.path().starts_with(GUARDED_PREFIX) {
            return true;
        }

        req.headers()
            .get(ACCESS_KEY_HEADER)
            .map(|presented| bool::from(presented.as_bytes().ct_eq(expected.as_bytes())))
            .unwrap_or(false)
    }
}

impl<S, B> Service<ServiceRequest> for AccessKeyService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if !self.admits(&req) {
            tracing::info!(path = %req.path(), "Rejected request without a valid access key");
            let response = HttpResponse::Unauthorized()
                .json(ApiResponse::failure("invalid access key"))
                .map_into_right_body();
            let (request, _payload) = req.into_parts();
            return Box::pin(async move { Ok(ServiceResponse::new(request, response)) });
        }

        let fut = self.service.call(req);
        Box::pin(async move { fut.await.map(ServiceResponse::map_into_left_body) })
    }
}
