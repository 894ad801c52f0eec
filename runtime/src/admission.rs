//! The admission webhook (spec.md §6, §7 "Validation"): denies a create or
//! update before it's persisted if the spec fails the checks in
//! [`crate::validation`]. Webhook TLS bootstrap is handled by `kubert`, not
//! here.

use crate::validation::{self, ValidationError};
use anyhow::{anyhow, Result};
use elbv2_controller_k8s_api::{
    GlobalAccelerator, GlobalAcceleratorSpec, ListenerRuleConfiguration,
    ListenerRuleConfigurationSpec, LoadBalancerConfiguration, LoadBalancerConfigurationSpec,
    TargetGroupBinding, TargetGroupBindingSpec, TargetGroupConfiguration,
    TargetGroupConfigurationSpec,
};
use futures::future;
use http_body_util::BodyExt;
use hyper::{http, Request, Response};
use kube::{core::DynamicObject, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

#[derive(Clone, Default)]
pub struct Admission {}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read request body: {0}")]
    Request(#[from] hyper::Error),

    #[error("failed to encode json response: {0}")]
    Json(#[from] serde_json::Error),
}

type Review = kube::core::admission::AdmissionReview<DynamicObject>;
type AdmissionRequest = kube::core::admission::AdmissionRequest<DynamicObject>;
type AdmissionResponse = kube::core::admission::AdmissionResponse;
type AdmissionReview = kube::core::admission::AdmissionReview<DynamicObject>;

type Body = http_body_util::Full<bytes::Bytes>;

trait Validate {
    fn validate(&self, ns: &str, name: &str, annotations: &BTreeMap<String, String>) -> Result<(), ValidationError>;
}

impl tower::Service<Request<hyper::body::Incoming>> for Admission {
    type Response = Response<Body>;
    type Error = Error;
    type Future = future::BoxFuture<'static, Result<Response<Body>, Error>>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<hyper::body::Incoming>) -> Self::Future {
        trace!(?req);
        if req.method() != http::Method::POST || req.uri().path() != "/" {
            return Box::pin(future::ok(
                Response::builder()
                    .status(http::StatusCode::NOT_FOUND)
                    .body(Body::default())
                    .expect("not found response must be valid"),
            ));
        }

        let admission = self.clone();
        Box::pin(async move {
            use bytes::Buf;
            let bytes = req.into_body().collect().await?.to_bytes();
            let review: Review = match serde_json::from_reader(bytes.reader()) {
                Ok(review) => review,
                Err(error) => {
                    warn!(%error, "failed to parse request body");
                    return json_response(AdmissionResponse::invalid(error).into_review());
                }
            };
            trace!(?review);

            let rsp = match review.try_into() {
                Ok(req) => {
                    debug!(?req);
                    admission.admit(req).await
                }
                Err(error) => {
                    warn!(%error, "invalid admission request");
                    AdmissionResponse::invalid(error)
                }
            };
            debug!(?rsp);
            json_response(rsp.into_review())
        })
    }
}

impl Admission {
    pub fn new() -> Self {
        Self {}
    }

    async fn admit(self, req: AdmissionRequest) -> AdmissionResponse {
        if is_kind::<LoadBalancerConfiguration>(&req) {
            return self.admit_spec::<LoadBalancerConfigurationSpec>(req).await;
        }
        if is_kind::<GlobalAccelerator>(&req) {
            return self.admit_spec::<GlobalAcceleratorSpec>(req).await;
        }
        if is_kind::<TargetGroupBinding>(&req) {
            return self.admit_spec::<TargetGroupBindingSpec>(req).await;
        }
        if is_kind::<TargetGroupConfiguration>(&req) {
            return self.admit_spec::<TargetGroupConfigurationSpec>(req).await;
        }
        if is_kind::<ListenerRuleConfiguration>(&req) {
            return self.admit_spec::<ListenerRuleConfigurationSpec>(req).await;
        }

        AdmissionResponse::invalid(format_args!(
            "unsupported resource type: {}.{}.{}",
            req.kind.group, req.kind.version, req.kind.kind
        ))
    }

    async fn admit_spec<T>(self, req: AdmissionRequest) -> AdmissionResponse
    where
        T: DeserializeOwned,
        T: Validate,
    {
        let rsp = AdmissionResponse::from(&req);

        let kind = req.kind.kind.clone();
        let (obj, spec) = match parse_spec::<T>(req) {
            Ok(spec) => spec,
            Err(error) => {
                info!(%error, "failed to parse {} spec", kind);
                return rsp.deny(error);
            }
        };

        let ns = obj.namespace().unwrap_or_default();
        let name = obj.name_any();
        let annotations = obj.annotations();

        if let Err(error) = spec.validate(&ns, &name, annotations) {
            info!(%error, %ns, %name, %kind, "denied");
            return rsp.deny(error);
        }

        rsp
    }
}

fn is_kind<T>(req: &AdmissionRequest) -> bool
where
    T: Resource,
    T::DynamicType: Default,
{
    let dt = Default::default();
    req.kind.group.eq_ignore_ascii_case(&T::group(&dt)) && req.kind.kind.eq_ignore_ascii_case(&T::kind(&dt))
}

fn json_response(rsp: AdmissionReview) -> Result<Response<Body>, Error> {
    let bytes = serde_json::to_vec(&rsp)?;
    Ok(Response::builder()
        .status(http::StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(bytes))
        .expect("admission review response must be valid"))
}

fn parse_spec<T: DeserializeOwned>(req: AdmissionRequest) -> Result<(DynamicObject, T)> {
    let obj = req.object.ok_or_else(|| anyhow!("admission request missing 'object'"))?;
    let spec = {
        let data = obj.data.get("spec").cloned().ok_or_else(|| anyhow!("admission request missing 'spec'"))?;
        serde_json::from_value(data)?
    };
    Ok((obj, spec))
}

impl Validate for LoadBalancerConfigurationSpec {
    fn validate(&self, _ns: &str, _name: &str, _annotations: &BTreeMap<String, String>) -> Result<(), ValidationError> {
        validation::validate_load_balancer_configuration(self)
    }
}

impl Validate for GlobalAcceleratorSpec {
    fn validate(&self, _ns: &str, _name: &str, _annotations: &BTreeMap<String, String>) -> Result<(), ValidationError> {
        validation::validate_global_accelerator(self)
    }
}

impl Validate for TargetGroupBindingSpec {
    fn validate(&self, _ns: &str, _name: &str, _annotations: &BTreeMap<String, String>) -> Result<(), ValidationError> {
        validation::validate_target_group_binding(self)
    }
}

impl Validate for TargetGroupConfigurationSpec {
    fn validate(&self, _ns: &str, _name: &str, _annotations: &BTreeMap<String, String>) -> Result<(), ValidationError> {
        Ok(())
    }
}

impl Validate for ListenerRuleConfigurationSpec {
    fn validate(&self, _ns: &str, _name: &str, _annotations: &BTreeMap<String, String>) -> Result<(), ValidationError> {
        Ok(())
    }
}
