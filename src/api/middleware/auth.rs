use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::Method,
    Error, HttpResponse,
};
use serde_json::json;
use std::{
    future::{ready, Future, Ready},
    pin::Pin,
    rc::Rc,
};
use tracing::warn;

/// Bearer-token check against the configured keys. An empty key list leaves the API open.
pub struct ApiKeyAuth {
    keys: Rc<Vec<String>>,
}

impl ApiKeyAuth {
    pub fn new(keys: Vec<String>) -> Self {
        Self { keys: Rc::new(keys) }
    }
}

impl<S, B> Transform<S, ServiceRequest> for ApiKeyAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = ApiKeyAuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ApiKeyAuthMiddleware {
            service: Rc::new(service),
            keys: self.keys.clone(),
        }))
    }
}

pub struct ApiKeyAuthMiddleware<S> {
    service: Rc<S>,
    keys: Rc<Vec<String>>,
}

fn is_public(req: &ServiceRequest) -> bool {
    req.method() == Method::OPTIONS
        || req.path() == "/"
        || req.path() == "/health"
        || req.path().starts_with("/uploads/")
}

fn presented_key(req: &ServiceRequest) -> Option<String> {
    if let Some(value) = req.headers().get("Authorization") {
        return value
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_string);
    }
    // Browsers cannot set headers on a WebSocket upgrade.
    qstring::QString::from(req.query_string())
        .get("api_key")
        .map(str::to_string)
}

impl<S, B> Service<ServiceRequest> for ApiKeyAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv = self.service.clone();

        let allowed = self.keys.is_empty()
            || is_public(&req)
            || presented_key(&req).is_some_and(|token| self.keys.iter().any(|k| *k == token));

        if !allowed {
            warn!(path = req.path(), "Rejected request without a valid API key");
            let response = HttpResponse::Unauthorized()
                .json(json!({"success": false, "error": "Invalid or missing API key"}));
            return Box::pin(async move { Ok(req.into_response(response).map_into_right_body()) });
        }

        Box::pin(async move {
            let res = srv.call(req).await?;
            Ok(res.map_into_left_body())
        })
    }
}
