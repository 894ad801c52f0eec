//! The Cloud Client Facade (spec.md §4.2, §6): a typed wrapper over the
//! ELBv2/EC2/ACM/Resource Groups Tagging/STS SDK clients that centralizes
//! region/VPC inference, endpoint overrides, assume-role credentials, and
//! throttling — so the Reconciliation Engine and Target Synchronizer never
//! touch an `aws-sdk-*` client directly.

use crate::creds::AssumeRoleCache;
use crate::error::{classify, ClientError};
use crate::throttler::Throttler;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sts::config::Credentials;
use aws_smithy_types::error::metadata::ProvideErrorMetadata;
use std::collections::HashMap;
use std::time::Instant;
use tracing::debug;

/// Endpoint overrides keyed by service name (`elasticloadbalancing`, `ec2`,
/// `acm`, `resourcegroupstaggingapi`, `sts`) for VPC-endpoint or
/// LocalStack-style testing setups (spec.md §6 `--aws-endpoint-*`).
pub type EndpointOverrides = HashMap<String, String>;

pub struct CloudClientConfig {
    pub region: Option<String>,
    pub vpc_id: Option<String>,
    pub role_arn: Option<String>,
    pub max_retries: u32,
    pub endpoint_overrides: EndpointOverrides,
    pub throttle: Throttler,
}

impl Default for CloudClientConfig {
    fn default() -> Self {
        Self {
            region: None,
            vpc_id: None,
            role_arn: None,
            max_retries: 10,
            endpoint_overrides: HashMap::new(),
            throttle: Throttler::empty(),
        }
    }
}

pub struct CloudClient {
    pub elbv2: aws_sdk_elasticloadbalancingv2::Client,
    pub ec2: aws_sdk_ec2::Client,
    pub acm: aws_sdk_acm::Client,
    pub rgt: aws_sdk_resourcegroupstaggingapi::Client,
    pub sts: aws_sdk_sts::Client,
    /// Global Accelerator only serves its control-plane API out of
    /// `us-west-2` regardless of where the accelerator's endpoints live;
    /// `CloudClient::new` pins this client to that region rather than
    /// the region the rest of the facade was built for (spec.md §6).
    pub ga: aws_sdk_globalaccelerator::Client,
    pub region: String,
    pub vpc_id: String,
    creds: Option<AssumeRoleCache>,
    role_arn: Option<String>,
    throttle: Throttler,
}

impl CloudClient {
    /// Builds every service client from a single inferred `SdkConfig`,
    /// applying endpoint overrides per-service. Region inference follows the
    /// standard provider chain (env, profile, IMDS) with `us-east-1` as the
    /// final fallback; VPC inference falls back to the VPC of the instance
    /// this process runs on when not given explicitly (spec.md §6).
    pub async fn new(config: CloudClientConfig) -> Result<Self, ClientError> {
        let region_provider = aws_config::meta::region::RegionProviderChain::first_try(
            config.region.clone().map(Region::new),
        )
        .or_default_provider()
        .or_else(Region::new("us-east-1"));

        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region_provider);
        loader = loader.retry_config(aws_config::retry::RetryConfig::standard().with_max_attempts(config.max_retries));
        let base = loader.load().await;

        let region = base.region().map(|r| r.to_string()).unwrap_or_else(|| "us-east-1".to_string());

        let sts = build_client(aws_sdk_sts::Client::new, &base, config.endpoint_overrides.get("sts"));

        let (sdk_config, creds, role_arn) = if let Some(role_arn) = config.role_arn.clone() {
            let cache = AssumeRoleCache::new();
            let sts_for_assume = sts.clone();
            let arn_for_assume = role_arn.clone();
            let credentials = cache
                .get_or_refresh(&role_arn, move || {
                    assume_role(sts_for_assume, arn_for_assume)
                })
                .await?;
            let builder = base.to_builder().credentials_provider(credentials);
            (builder.build(), Some(cache), Some(role_arn))
        } else {
            (base, None, None)
        };

        let vpc_id = match config.vpc_id {
            Some(id) => id,
            None => infer_vpc_id(&sdk_config, &config.endpoint_overrides).await?,
        };

        let ga_config = sdk_config.to_builder().region(Region::new("us-west-2")).build();

        Ok(Self {
            elbv2: build_client(aws_sdk_elasticloadbalancingv2::Client::new, &sdk_config, config.endpoint_overrides.get("elasticloadbalancing")),
            ec2: build_client(aws_sdk_ec2::Client::new, &sdk_config, config.endpoint_overrides.get("ec2")),
            acm: build_client(aws_sdk_acm::Client::new, &sdk_config, config.endpoint_overrides.get("acm")),
            rgt: build_client(aws_sdk_resourcegroupstaggingapi::Client::new, &sdk_config, config.endpoint_overrides.get("resourcegroupstaggingapi")),
            sts: build_client(aws_sdk_sts::Client::new, &sdk_config, config.endpoint_overrides.get("sts")),
            ga: build_client(aws_sdk_globalaccelerator::Client::new, &ga_config, config.endpoint_overrides.get("globalaccelerator")),
            region,
            vpc_id,
            creds,
            role_arn,
            throttle: config.throttle,
        })
    }

    /// Re-assumes the configured role if its cached credentials are near
    /// expiry. A no-op when the controller wasn't configured with
    /// `--aws-role-arn`. Call sites that hold long-lived clients (the
    /// Reconciliation Engine's main loop) call this once per reconcile pass
    /// rather than per SDK call.
    pub async fn refresh_credentials_if_needed(&self) -> Result<(), ClientError> {
        let (Some(cache), Some(role_arn)) = (&self.creds, &self.role_arn) else {
            return Ok(());
        };
        let sts = self.sts.clone();
        let arn = role_arn.clone();
        cache.get_or_refresh(role_arn, move || assume_role(sts, arn)).await?;
        Ok(())
    }

    pub async fn describe_load_balancer_by_arn(
        &self,
        arn: &str,
    ) -> Result<Option<aws_sdk_elasticloadbalancingv2::types::LoadBalancer>, ClientError> {
        self.throttle.acquire("elasticloadbalancing", "DescribeLoadBalancers").await;
        match self.elbv2.describe_load_balancers().load_balancer_arns(arn).send().await {
            Ok(out) => Ok(out.load_balancers.unwrap_or_default().into_iter().next()),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(classify("elasticloadbalancing", "DescribeLoadBalancers", &e)),
        }
    }

    pub async fn resources_by_tag(
        &self,
        resource_type_filters: &[String],
        tag_filters: &[(String, Vec<String>)],
    ) -> Result<Vec<aws_sdk_resourcegroupstaggingapi::types::ResourceTagMapping>, ClientError> {
        self.throttle.acquire("resourcegroupstaggingapi", "GetResources").await;
        let tag_filters = tag_filters
            .iter()
            .map(|(k, v)| {
                aws_sdk_resourcegroupstaggingapi::types::TagFilter::builder()
                    .key(k)
                    .set_values(Some(v.clone()))
                    .build()
            })
            .collect::<Vec<_>>();

        let mut resources = Vec::new();
        let mut pagination_token = String::new();
        loop {
            self.throttle.acquire("resourcegroupstaggingapi", "GetResources").await;
            let mut req = self
                .rgt
                .get_resources()
                .set_resource_type_filters(Some(resource_type_filters.to_vec()))
                .set_tag_filters(Some(tag_filters.clone()));
            if !pagination_token.is_empty() {
                req = req.pagination_token(&pagination_token);
            }
            let out = req
                .send()
                .await
                .map_err(|e| classify("resourcegroupstaggingapi", "GetResources", &e))?;
            resources.extend(out.resource_tag_mapping_list.unwrap_or_default());
            match out.pagination_token.filter(|t| !t.is_empty()) {
                Some(next) => pagination_token = next,
                None => break,
            }
        }
        Ok(resources)
    }

    pub async fn describe_certificate(
        &self,
        arn: &str,
    ) -> Result<Option<aws_sdk_acm::types::CertificateDetail>, ClientError> {
        self.throttle.acquire("acm", "DescribeCertificate").await;
        match self.acm.describe_certificate().certificate_arn(arn).send().await {
            Ok(out) => Ok(out.certificate),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(classify("acm", "DescribeCertificate", &e)),
        }
    }

    pub async fn describe_security_group(
        &self,
        group_id: &str,
    ) -> Result<Option<aws_sdk_ec2::types::SecurityGroup>, ClientError> {
        self.throttle.acquire("ec2", "DescribeSecurityGroups").await;
        match self.ec2.describe_security_groups().group_ids(group_id).send().await {
            Ok(out) => Ok(out.security_groups.unwrap_or_default().into_iter().next()),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(classify("ec2", "DescribeSecurityGroups", &e)),
        }
    }

    /// Discovers the security groups attached to every running EC2 instance
    /// backing `cluster`'s worker nodes, for backend ingress programming
    /// (spec.md §4.4 step 7, `ManageBackendSecurityGroupRules=true`).
    /// Follows the conventional EKS node tag `kubernetes.io/cluster/<name>`
    /// (`owned` or `shared`) rather than a Kubernetes API call, since the
    /// Reconciliation Engine only ever talks to AWS.
    pub async fn describe_node_security_groups(&self, cluster: &str) -> Result<Vec<String>, ClientError> {
        self.throttle.acquire("ec2", "DescribeInstances").await;
        let tag_key = format!("tag:kubernetes.io/cluster/{cluster}");
        let out = self
            .ec2
            .describe_instances()
            .filters(
                aws_sdk_ec2::types::Filter::builder()
                    .name(tag_key)
                    .values("owned")
                    .values("shared")
                    .build(),
            )
            .filters(
                aws_sdk_ec2::types::Filter::builder()
                    .name("instance-state-name")
                    .values("running")
                    .build(),
            )
            .send()
            .await
            .map_err(|e| classify("ec2", "DescribeInstances", &e))?;
        let mut group_ids: Vec<String> = out
            .reservations
            .unwrap_or_default()
            .into_iter()
            .flat_map(|r| r.instances.unwrap_or_default())
            .flat_map(|i| i.security_groups.unwrap_or_default())
            .filter_map(|g| g.group_id)
            .collect();
        group_ids.sort();
        group_ids.dedup();
        Ok(group_ids)
    }

    // --- mutating calls used by the Reconciliation Engine's apply step (spec.md §4.5) ---

    pub async fn create_load_balancer(
        &self,
        req: aws_sdk_elasticloadbalancingv2::operation::create_load_balancer::builders::CreateLoadBalancerFluentBuilder,
    ) -> Result<aws_sdk_elasticloadbalancingv2::types::LoadBalancer, ClientError> {
        self.throttle.acquire("elasticloadbalancing", "CreateLoadBalancer").await;
        let out = req
            .send()
            .await
            .map_err(|e| classify("elasticloadbalancing", "CreateLoadBalancer", &e))?;
        out.load_balancers
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::Fatal {
                service: "elasticloadbalancing",
                operation: "CreateLoadBalancer",
                message: "response carried no load balancer".into(),
            })
    }

    pub async fn delete_load_balancer(&self, arn: &str) -> Result<(), ClientError> {
        self.throttle.acquire("elasticloadbalancing", "DeleteLoadBalancer").await;
        match self.elbv2.delete_load_balancer().load_balancer_arn(arn).send().await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(classify("elasticloadbalancing", "DeleteLoadBalancer", &e)),
        }
    }

    pub async fn modify_load_balancer_attributes(
        &self,
        arn: &str,
        attributes: Vec<aws_sdk_elasticloadbalancingv2::types::LoadBalancerAttribute>,
    ) -> Result<(), ClientError> {
        self.throttle.acquire("elasticloadbalancing", "ModifyLoadBalancerAttributes").await;
        self.elbv2
            .modify_load_balancer_attributes()
            .load_balancer_arn(arn)
            .set_attributes(Some(attributes))
            .send()
            .await
            .map_err(|e| classify("elasticloadbalancing", "ModifyLoadBalancerAttributes", &e))?;
        Ok(())
    }

    pub async fn create_listener(
        &self,
        req: aws_sdk_elasticloadbalancingv2::operation::create_listener::builders::CreateListenerFluentBuilder,
    ) -> Result<aws_sdk_elasticloadbalancingv2::types::Listener, ClientError> {
        self.throttle.acquire("elasticloadbalancing", "CreateListener").await;
        let out = req
            .send()
            .await
            .map_err(|e| classify("elasticloadbalancing", "CreateListener", &e))?;
        out.listeners
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::Fatal {
                service: "elasticloadbalancing",
                operation: "CreateListener",
                message: "response carried no listener".into(),
            })
    }

    pub async fn modify_listener(
        &self,
        req: aws_sdk_elasticloadbalancingv2::operation::modify_listener::builders::ModifyListenerFluentBuilder,
    ) -> Result<(), ClientError> {
        self.throttle.acquire("elasticloadbalancing", "ModifyListener").await;
        req.send()
            .await
            .map_err(|e| classify("elasticloadbalancing", "ModifyListener", &e))?;
        Ok(())
    }

    pub async fn delete_listener(&self, arn: &str) -> Result<(), ClientError> {
        self.throttle.acquire("elasticloadbalancing", "DeleteListener").await;
        match self.elbv2.delete_listener().listener_arn(arn).send().await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(classify("elasticloadbalancing", "DeleteListener", &e)),
        }
    }

    pub async fn create_rule(
        &self,
        req: aws_sdk_elasticloadbalancingv2::operation::create_rule::builders::CreateRuleFluentBuilder,
    ) -> Result<aws_sdk_elasticloadbalancingv2::types::Rule, ClientError> {
        self.throttle.acquire("elasticloadbalancing", "CreateRule").await;
        let out = req.send().await.map_err(|e| classify("elasticloadbalancing", "CreateRule", &e))?;
        out.rules
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::Fatal {
                service: "elasticloadbalancing",
                operation: "CreateRule",
                message: "response carried no rule".into(),
            })
    }

    pub async fn modify_rule(
        &self,
        req: aws_sdk_elasticloadbalancingv2::operation::modify_rule::builders::ModifyRuleFluentBuilder,
    ) -> Result<(), ClientError> {
        self.throttle.acquire("elasticloadbalancing", "ModifyRule").await;
        req.send().await.map_err(|e| classify("elasticloadbalancing", "ModifyRule", &e))?;
        Ok(())
    }

    pub async fn delete_rule(&self, arn: &str) -> Result<(), ClientError> {
        self.throttle.acquire("elasticloadbalancing", "DeleteRule").await;
        match self.elbv2.delete_rule().rule_arn(arn).send().await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(classify("elasticloadbalancing", "DeleteRule", &e)),
        }
    }

    pub async fn create_target_group(
        &self,
        req: aws_sdk_elasticloadbalancingv2::operation::create_target_group::builders::CreateTargetGroupFluentBuilder,
    ) -> Result<aws_sdk_elasticloadbalancingv2::types::TargetGroup, ClientError> {
        self.throttle.acquire("elasticloadbalancing", "CreateTargetGroup").await;
        let out = req
            .send()
            .await
            .map_err(|e| classify("elasticloadbalancing", "CreateTargetGroup", &e))?;
        out.target_groups
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::Fatal {
                service: "elasticloadbalancing",
                operation: "CreateTargetGroup",
                message: "response carried no target group".into(),
            })
    }

    pub async fn modify_target_group_attributes(
        &self,
        arn: &str,
        attributes: Vec<aws_sdk_elasticloadbalancingv2::types::TargetGroupAttribute>,
    ) -> Result<(), ClientError> {
        self.throttle.acquire("elasticloadbalancing", "ModifyTargetGroupAttributes").await;
        self.elbv2
            .modify_target_group_attributes()
            .target_group_arn(arn)
            .set_attributes(Some(attributes))
            .send()
            .await
            .map_err(|e| classify("elasticloadbalancing", "ModifyTargetGroupAttributes", &e))?;
        Ok(())
    }

    pub async fn delete_target_group(&self, arn: &str) -> Result<(), ClientError> {
        self.throttle.acquire("elasticloadbalancing", "DeleteTargetGroup").await;
        match self.elbv2.delete_target_group().target_group_arn(arn).send().await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(classify("elasticloadbalancing", "DeleteTargetGroup", &e)),
        }
    }

    pub async fn register_targets(
        &self,
        target_group_arn: &str,
        targets: Vec<aws_sdk_elasticloadbalancingv2::types::TargetDescription>,
    ) -> Result<(), ClientError> {
        if targets.is_empty() {
            return Ok(());
        }
        self.throttle.acquire("elasticloadbalancing", "RegisterTargets").await;
        self.elbv2
            .register_targets()
            .target_group_arn(target_group_arn)
            .set_targets(Some(targets))
            .send()
            .await
            .map_err(|e| classify("elasticloadbalancing", "RegisterTargets", &e))?;
        Ok(())
    }

    pub async fn deregister_targets(
        &self,
        target_group_arn: &str,
        targets: Vec<aws_sdk_elasticloadbalancingv2::types::TargetDescription>,
    ) -> Result<(), ClientError> {
        if targets.is_empty() {
            return Ok(());
        }
        self.throttle.acquire("elasticloadbalancing", "DeregisterTargets").await;
        match self
            .elbv2
            .deregister_targets()
            .target_group_arn(target_group_arn)
            .set_targets(Some(targets))
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(classify("elasticloadbalancing", "DeregisterTargets", &e)),
        }
    }

    pub async fn describe_target_health(
        &self,
        target_group_arn: &str,
    ) -> Result<Vec<aws_sdk_elasticloadbalancingv2::types::TargetHealthDescription>, ClientError> {
        self.throttle.acquire("elasticloadbalancing", "DescribeTargetHealth").await;
        match self
            .elbv2
            .describe_target_health()
            .target_group_arn(target_group_arn)
            .send()
            .await
        {
            Ok(out) => Ok(out.target_health_descriptions.unwrap_or_default()),
            Err(e) if is_not_found(&e) => Ok(Vec::new()),
            Err(e) => Err(classify("elasticloadbalancing", "DescribeTargetHealth", &e)),
        }
    }

    pub async fn tag_elbv2_resource(
        &self,
        arn: &str,
        tags: Vec<aws_sdk_elasticloadbalancingv2::types::Tag>,
    ) -> Result<(), ClientError> {
        self.throttle.acquire("elasticloadbalancing", "AddTags").await;
        self.elbv2
            .add_tags()
            .resource_arns(arn)
            .set_tags(Some(tags))
            .send()
            .await
            .map_err(|e| classify("elasticloadbalancing", "AddTags", &e))?;
        Ok(())
    }

    pub async fn modify_listener_attributes(
        &self,
        arn: &str,
        attributes: Vec<aws_sdk_elasticloadbalancingv2::types::ListenerAttribute>,
    ) -> Result<(), ClientError> {
        if attributes.is_empty() {
            return Ok(());
        }
        self.throttle.acquire("elasticloadbalancing", "ModifyListenerAttributes").await;
        self.elbv2
            .modify_listener_attributes()
            .listener_arn(arn)
            .set_attributes(Some(attributes))
            .send()
            .await
            .map_err(|e| classify("elasticloadbalancing", "ModifyListenerAttributes", &e))?;
        Ok(())
    }

    /// Attaches a load balancer to its final set of security groups. Split
    /// out from `CreateLoadBalancer` because a managed security group
    /// depends on the load balancer existing first (spec.md §4.4 step 7),
    /// so the load balancer is always created before its own security
    /// groups resolve.
    pub async fn set_security_groups(&self, lb_arn: &str, group_ids: Vec<String>) -> Result<(), ClientError> {
        self.throttle.acquire("elasticloadbalancing", "SetSecurityGroups").await;
        self.elbv2
            .set_security_groups()
            .load_balancer_arn(lb_arn)
            .set_security_groups(Some(group_ids))
            .send()
            .await
            .map_err(|e| classify("elasticloadbalancing", "SetSecurityGroups", &e))?;
        Ok(())
    }

    pub async fn create_security_group(
        &self,
        name: &str,
        description: &str,
        vpc_id: &str,
        tags: Vec<aws_sdk_ec2::types::Tag>,
    ) -> Result<String, ClientError> {
        self.throttle.acquire("ec2", "CreateSecurityGroup").await;
        let tag_spec = aws_sdk_ec2::types::TagSpecification::builder()
            .resource_type(aws_sdk_ec2::types::ResourceType::SecurityGroup)
            .set_tags(Some(tags))
            .build();
        let out = self
            .ec2
            .create_security_group()
            .group_name(name)
            .description(description)
            .vpc_id(vpc_id)
            .tag_specifications(tag_spec)
            .send()
            .await
            .map_err(|e| classify("ec2", "CreateSecurityGroup", &e))?;
        out.group_id.ok_or_else(|| ClientError::Fatal {
            service: "ec2",
            operation: "CreateSecurityGroup",
            message: "response carried no group id".into(),
        })
    }

    pub async fn delete_security_group(&self, group_id: &str) -> Result<(), ClientError> {
        self.throttle.acquire("ec2", "DeleteSecurityGroup").await;
        match self.ec2.delete_security_group().group_id(group_id).send().await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(classify("ec2", "DeleteSecurityGroup", &e)),
        }
    }

    pub async fn authorize_security_group_ingress(
        &self,
        group_id: &str,
        permissions: Vec<aws_sdk_ec2::types::IpPermission>,
    ) -> Result<(), ClientError> {
        if permissions.is_empty() {
            return Ok(());
        }
        self.throttle.acquire("ec2", "AuthorizeSecurityGroupIngress").await;
        match self
            .ec2
            .authorize_security_group_ingress()
            .group_id(group_id)
            .set_ip_permissions(Some(permissions))
            .send()
            .await
        {
            Ok(_) => Ok(()),
            // Already-authorized duplicates are idempotent from the Engine's perspective.
            Err(e) if e.as_service_error().map(ProvideErrorMetadata::code) == Some(Some("InvalidPermission.Duplicate")) => Ok(()),
            Err(e) => Err(classify("ec2", "AuthorizeSecurityGroupIngress", &e)),
        }
    }

    pub async fn revoke_security_group_ingress(
        &self,
        group_id: &str,
        permissions: Vec<aws_sdk_ec2::types::IpPermission>,
    ) -> Result<(), ClientError> {
        if permissions.is_empty() {
            return Ok(());
        }
        self.throttle.acquire("ec2", "RevokeSecurityGroupIngress").await;
        match self
            .ec2
            .revoke_security_group_ingress()
            .group_id(group_id)
            .set_ip_permissions(Some(permissions))
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(classify("ec2", "RevokeSecurityGroupIngress", &e)),
        }
    }

    // --- Global Accelerator calls used by the GlobalAccelerator reconciler (spec.md §6) ---

    pub async fn describe_accelerator(&self, arn: &str) -> Result<Option<aws_sdk_globalaccelerator::types::Accelerator>, ClientError> {
        self.throttle.acquire("globalaccelerator", "DescribeAccelerator").await;
        match self.ga.describe_accelerator().accelerator_arn(arn).send().await {
            Ok(out) => Ok(out.accelerator),
            Err(e) if is_ga_not_found(&e) => Ok(None),
            Err(e) => Err(classify("globalaccelerator", "DescribeAccelerator", &e)),
        }
    }

    pub async fn create_accelerator(
        &self,
        name: &str,
        ip_address_type: aws_sdk_globalaccelerator::types::IpAddressType,
        ip_addresses: Vec<String>,
        idempotency_token: &str,
        tags: Vec<aws_sdk_globalaccelerator::types::Tag>,
    ) -> Result<aws_sdk_globalaccelerator::types::Accelerator, ClientError> {
        self.throttle.acquire("globalaccelerator", "CreateAccelerator").await;
        let out = self
            .ga
            .create_accelerator()
            .name(name)
            .ip_address_type(ip_address_type)
            .set_ip_addresses(if ip_addresses.is_empty() { None } else { Some(ip_addresses) })
            .idempotency_token(idempotency_token)
            .set_tags(Some(tags))
            .send()
            .await
            .map_err(|e| classify("globalaccelerator", "CreateAccelerator", &e))?;
        out.accelerator.ok_or_else(|| ClientError::Fatal {
            service: "globalaccelerator",
            operation: "CreateAccelerator",
            message: "response carried no accelerator".into(),
        })
    }

    pub async fn update_accelerator(
        &self,
        arn: &str,
        ip_address_type: aws_sdk_globalaccelerator::types::IpAddressType,
    ) -> Result<(), ClientError> {
        self.throttle.acquire("globalaccelerator", "UpdateAccelerator").await;
        self.ga
            .update_accelerator()
            .accelerator_arn(arn)
            .ip_address_type(ip_address_type)
            .send()
            .await
            .map_err(|e| classify("globalaccelerator", "UpdateAccelerator", &e))?;
        Ok(())
    }

    pub async fn disable_accelerator(&self, arn: &str) -> Result<(), ClientError> {
        self.throttle.acquire("globalaccelerator", "UpdateAccelerator").await;
        self.ga
            .update_accelerator()
            .accelerator_arn(arn)
            .enabled(false)
            .send()
            .await
            .map_err(|e| classify("globalaccelerator", "UpdateAccelerator", &e))?;
        Ok(())
    }

    pub async fn delete_accelerator(&self, arn: &str) -> Result<(), ClientError> {
        self.throttle.acquire("globalaccelerator", "DeleteAccelerator").await;
        match self.ga.delete_accelerator().accelerator_arn(arn).send().await {
            Ok(_) => Ok(()),
            Err(e) if is_ga_not_found(&e) => Ok(()),
            Err(e) => Err(classify("globalaccelerator", "DeleteAccelerator", &e)),
        }
    }

    pub async fn list_listeners(&self, accelerator_arn: &str) -> Result<Vec<aws_sdk_globalaccelerator::types::Listener>, ClientError> {
        self.throttle.acquire("globalaccelerator", "ListListeners").await;
        let out = self
            .ga
            .list_listeners()
            .accelerator_arn(accelerator_arn)
            .send()
            .await
            .map_err(|e| classify("globalaccelerator", "ListListeners", &e))?;
        Ok(out.listeners.unwrap_or_default())
    }

    pub async fn create_ga_listener(
        &self,
        accelerator_arn: &str,
        protocol: aws_sdk_globalaccelerator::types::Protocol,
        port_ranges: Vec<aws_sdk_globalaccelerator::types::PortRange>,
        client_affinity: aws_sdk_globalaccelerator::types::ClientAffinity,
        idempotency_token: &str,
    ) -> Result<aws_sdk_globalaccelerator::types::Listener, ClientError> {
        self.throttle.acquire("globalaccelerator", "CreateListener").await;
        let out = self
            .ga
            .create_listener()
            .accelerator_arn(accelerator_arn)
            .protocol(protocol)
            .set_port_ranges(Some(port_ranges))
            .client_affinity(client_affinity)
            .idempotency_token(idempotency_token)
            .send()
            .await
            .map_err(|e| classify("globalaccelerator", "CreateListener", &e))?;
        out.listener.ok_or_else(|| ClientError::Fatal {
            service: "globalaccelerator",
            operation: "CreateListener",
            message: "response carried no listener".into(),
        })
    }

    pub async fn update_ga_listener(
        &self,
        listener_arn: &str,
        port_ranges: Vec<aws_sdk_globalaccelerator::types::PortRange>,
        client_affinity: aws_sdk_globalaccelerator::types::ClientAffinity,
    ) -> Result<(), ClientError> {
        self.throttle.acquire("globalaccelerator", "UpdateListener").await;
        self.ga
            .update_listener()
            .listener_arn(listener_arn)
            .set_port_ranges(Some(port_ranges))
            .client_affinity(client_affinity)
            .send()
            .await
            .map_err(|e| classify("globalaccelerator", "UpdateListener", &e))?;
        Ok(())
    }

    pub async fn delete_ga_listener(&self, listener_arn: &str) -> Result<(), ClientError> {
        self.throttle.acquire("globalaccelerator", "DeleteListener").await;
        match self.ga.delete_listener().listener_arn(listener_arn).send().await {
            Ok(_) => Ok(()),
            Err(e) if is_ga_not_found(&e) => Ok(()),
            Err(e) => Err(classify("globalaccelerator", "DeleteListener", &e)),
        }
    }

    pub async fn list_endpoint_groups(&self, listener_arn: &str) -> Result<Vec<aws_sdk_globalaccelerator::types::EndpointGroup>, ClientError> {
        self.throttle.acquire("globalaccelerator", "ListEndpointGroups").await;
        let out = self
            .ga
            .list_endpoint_groups()
            .listener_arn(listener_arn)
            .send()
            .await
            .map_err(|e| classify("globalaccelerator", "ListEndpointGroups", &e))?;
        Ok(out.endpoint_groups.unwrap_or_default())
    }

    pub async fn create_endpoint_group(
        &self,
        req: aws_sdk_globalaccelerator::operation::create_endpoint_group::builders::CreateEndpointGroupFluentBuilder,
    ) -> Result<aws_sdk_globalaccelerator::types::EndpointGroup, ClientError> {
        self.throttle.acquire("globalaccelerator", "CreateEndpointGroup").await;
        let out = req
            .send()
            .await
            .map_err(|e| classify("globalaccelerator", "CreateEndpointGroup", &e))?;
        out.endpoint_group.ok_or_else(|| ClientError::Fatal {
            service: "globalaccelerator",
            operation: "CreateEndpointGroup",
            message: "response carried no endpoint group".into(),
        })
    }

    pub async fn update_endpoint_group(
        &self,
        req: aws_sdk_globalaccelerator::operation::update_endpoint_group::builders::UpdateEndpointGroupFluentBuilder,
    ) -> Result<(), ClientError> {
        self.throttle.acquire("globalaccelerator", "UpdateEndpointGroup").await;
        req.send().await.map_err(|e| classify("globalaccelerator", "UpdateEndpointGroup", &e))?;
        Ok(())
    }

    pub async fn delete_endpoint_group(&self, arn: &str) -> Result<(), ClientError> {
        self.throttle.acquire("globalaccelerator", "DeleteEndpointGroup").await;
        match self.ga.delete_endpoint_group().endpoint_group_arn(arn).send().await {
            Ok(_) => Ok(()),
            Err(e) if is_ga_not_found(&e) => Ok(()),
            Err(e) => Err(classify("globalaccelerator", "DeleteEndpointGroup", &e)),
        }
    }

    pub async fn tag_ga_resource(&self, arn: &str, tags: Vec<aws_sdk_globalaccelerator::types::Tag>) -> Result<(), ClientError> {
        if tags.is_empty() {
            return Ok(());
        }
        self.throttle.acquire("globalaccelerator", "TagResource").await;
        self.ga
            .tag_resource()
            .resource_arn(arn)
            .set_tags(Some(tags))
            .send()
            .await
            .map_err(|e| classify("globalaccelerator", "TagResource", &e))?;
        Ok(())
    }
}

fn build_client<C>(
    ctor: impl Fn(&aws_config::SdkConfig) -> C,
    base: &aws_config::SdkConfig,
    endpoint_override: Option<&String>,
) -> C
where
    C: CustomizableEndpointClient,
{
    match endpoint_override {
        Some(url) => ctor(&base.to_builder().endpoint_url(url).build()),
        None => ctor(base),
    }
}

/// Marker so [`build_client`] can be written once and reused per service
/// client type without repeating the `to_builder().endpoint_url(...)` dance
/// five times. Every `aws-sdk-*` client satisfies this trivially.
trait CustomizableEndpointClient {}
impl CustomizableEndpointClient for aws_sdk_elasticloadbalancingv2::Client {}
impl CustomizableEndpointClient for aws_sdk_ec2::Client {}
impl CustomizableEndpointClient for aws_sdk_acm::Client {}
impl CustomizableEndpointClient for aws_sdk_resourcegroupstaggingapi::Client {}
impl CustomizableEndpointClient for aws_sdk_sts::Client {}
impl CustomizableEndpointClient for aws_sdk_globalaccelerator::Client {}

async fn assume_role(
    sts: aws_sdk_sts::Client,
    role_arn: String,
) -> Result<(Credentials, Instant), ClientError> {
    debug!(role_arn, "assuming role");
    let out = sts
        .assume_role()
        .role_arn(&role_arn)
        .role_session_name("elbv2-gateway-controller")
        .send()
        .await
        .map_err(|e| classify("sts", "AssumeRole", &e))?;
    let creds = out
        .credentials
        .ok_or_else(|| ClientError::Fatal {
            service: "sts",
            operation: "AssumeRole",
            message: "response carried no credentials".into(),
        })?;
    let expiration = creds
        .expiration
        .as_secs_f64()
        .max(0.0);
    let expires_at = Instant::now() + std::time::Duration::from_secs_f64(expiration.min(3600.0 * 12.0));
    let credentials = Credentials::new(
        creds.access_key_id,
        creds.secret_access_key,
        Some(creds.session_token),
        None,
        "elbv2-gateway-controller-assume-role",
    );
    Ok((credentials, expires_at))
}

async fn infer_vpc_id(
    config: &aws_config::SdkConfig,
    endpoint_overrides: &EndpointOverrides,
) -> Result<String, ClientError> {
    let ec2 = build_client(aws_sdk_ec2::Client::new, config, endpoint_overrides.get("ec2"));
    let imds = aws_config::imds::client::Client::builder()
        .build();
    let instance_id = imds
        .get("/latest/meta-data/instance-id")
        .await
        .map_err(|e| ClientError::Fatal {
            service: "imds",
            operation: "GetInstanceId",
            message: e.to_string(),
        })?;
    let out = ec2
        .describe_instances()
        .instance_ids(instance_id.as_ref())
        .send()
        .await
        .map_err(|e| classify("ec2", "DescribeInstances", &e))?;
    out.reservations
        .unwrap_or_default()
        .into_iter()
        .flat_map(|r| r.instances.unwrap_or_default())
        .find_map(|i| i.vpc_id)
        .ok_or_else(|| ClientError::Fatal {
            service: "ec2",
            operation: "DescribeInstances",
            message: "could not infer VPC from instance metadata; pass --aws-vpc-id".into(),
        })
}

fn is_not_found<E: ProvideErrorMetadata, R>(err: &aws_smithy_runtime_api::client::result::SdkError<E, R>) -> bool {
    matches!(
        err.code(),
        Some(
            "LoadBalancerNotFoundException"
                | "TargetGroupNotFoundException"
                | "ListenerNotFoundException"
                | "RuleNotFoundException"
                | "CertificateNotFoundException"
                | "ResourceNotFoundException"
                | "InvalidGroup.NotFound"
        )
    )
}

fn is_ga_not_found<E: ProvideErrorMetadata, R>(err: &aws_smithy_runtime_api::client::result::SdkError<E, R>) -> bool {
    matches!(err.code(), Some("AcceleratorNotFoundException" | "ListenerNotFoundException" | "EndpointGroupNotFoundException"))
}
