#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod crd;
pub mod duration;
mod watch;

pub use self::watch::Watch;
pub use crd::{
    GlobalAccelerator, GlobalAcceleratorSpec, GlobalAcceleratorStatus, ListenerRuleConfiguration,
    ListenerRuleConfigurationSpec, LoadBalancerConfiguration, LoadBalancerConfigurationSpec,
    LoadBalancerConfigurationStatus, TargetGroupBinding, TargetGroupBindingSpec,
    TargetGroupBindingStatus, TargetGroupConfiguration, TargetGroupConfigurationSpec,
};
pub use gateway_api::apis::experimental as gateway;
pub use k8s_openapi::{
    api::{
        self,
        coordination::v1::Lease,
        core::v1::{
            Container, ContainerPort, Endpoints, HTTPGetAction, Namespace, Node, NodeSpec, Pod,
            PodSpec, PodStatus, Probe, Service, ServiceAccount, ServicePort, ServiceSpec,
        },
    },
    apimachinery::{
        self,
        pkg::{
            apis::meta::v1::{Condition, Time},
            util::intstr::IntOrString,
        },
    },
    NamespaceResourceScope,
};
pub use kube::{
    api::{Api, ListParams, ObjectMeta, Patch, PatchParams, Resource, ResourceExt},
    error::ErrorResponse,
    runtime::watcher::Event as WatchEvent,
    Client, Error,
};
