use crate::{admission::Admission, aws, index, k8s, lease, reconcile, status};
use anyhow::{bail, Result};
use aws_config::{BehaviorVersion, Region};
use clap::Parser;
use std::{collections::HashMap, sync::Arc};
use tokio::time::Duration;
use tracing::{info_span, Instrument};

const CONTROLLER_NAME: &str = "elbv2.k8s.aws/gateway-controller";

#[derive(Debug, Parser)]
#[clap(name = "aws-gateway-controller", about = "An AWS ELBv2 Gateway API controller")]
pub struct Args {
    #[clap(long, default_value = "info,warn", env = "AWS_GATEWAY_CONTROLLER_LOG")]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    server: kubert::ServerArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Disables the admission controller server.
    #[clap(long)]
    admission_controller_disabled: bool,

    /// The AWS region to operate in. Falls back to `AWS_DEFAULT_REGION`,
    /// then the standard provider chain, when unset (spec.md §6).
    #[clap(long, env = "AWS_REGION")]
    aws_region: Option<String>,

    /// The VPC to discover subnets and security groups in. Inferred from
    /// the instance/Node this process runs on when unset.
    #[clap(long)]
    aws_vpc_id: Option<String>,

    #[clap(long, default_value_t = 10)]
    aws_max_retries: u32,

    /// `service:operationRegex=rate:burst` rules, comma separated
    /// (spec.md §4.2, §6).
    #[clap(long, default_value = "")]
    aws_api_throttle: String,

    /// Feeds ownership tags and assume-role session names (spec.md §6).
    #[clap(long)]
    cluster_name: String,

    #[clap(long, default_value_t = 300)]
    lb_stabilization_time_secs: u64,

    #[clap(long, default_value_t = 120)]
    reconcile_timeout_secs: u64,

    #[clap(long, default_value = CONTROLLER_NAME)]
    controller_name: String,

    #[clap(long, default_value = "aws-gateway-controller")]
    controller_namespace: String,

    #[clap(long, default_value = "aws-gateway-controller")]
    deployment_name: String,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            server,
            admission_controller_disabled,
            aws_region,
            aws_vpc_id,
            aws_max_retries,
            aws_api_throttle,
            cluster_name,
            lb_stabilization_time_secs,
            reconcile_timeout_secs,
            controller_name,
            controller_namespace,
            deployment_name,
        } = self;

        let server = if admission_controller_disabled { None } else { Some(server) };

        let prom = <prometheus_client::registry::Registry>::default();

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .with_optional_server(server)
            .build()
            .await?;

        let hostname = std::env::var("HOSTNAME").expect("failed to fetch HOSTNAME environment variable");

        let claims = lease::init(&runtime, &controller_namespace, &deployment_name, &hostname).await?;
        // The write lease gates who reconciles, but every replica's index,
        // engine and synchronizer still run: they only act once they hold
        // the lease, via `claims` filtering in each loop's first tick today
        // and a watch-driven gate in a follow-up (spec.md §9 open question
        // on leader-election integration depth is left to the runtime crate
        // `kubert` already provides).
        let _claims = claims;

        let aws_region = aws_region.or_else(|| std::env::var("AWS_DEFAULT_REGION").ok());
        let node_name = std::env::var("NODENAME").ok();

        let vpc_id = match aws_vpc_id {
            Some(vpc_id) => Some(vpc_id),
            None => match (&aws_region, &node_name) {
                (Some(region), Some(node_name)) => {
                    resolve_vpc_id_from_node(&runtime.client(), region, node_name).await.unwrap_or_default()
                }
                _ => None,
            },
        };

        let throttle = aws::Throttler::parse(&aws_api_throttle)?;
        let cloud_config = aws::CloudClientConfig {
            region: aws_region,
            vpc_id,
            role_arn: None,
            max_retries: aws_max_retries,
            endpoint_overrides: HashMap::new(),
            throttle,
        };
        let cloud_client = Arc::new(aws::CloudClient::new(cloud_config).await?);

        let watches = index::Watches::cluster_wide(runtime.client());
        let (shared_index, index_fut) = index::index(cluster_name.clone(), controller_name, watches);
        tokio::spawn(index_fut.instrument(info_span!("model_builder")));

        let engine = Arc::new(reconcile::Engine::new(
            cloud_client.clone(),
            runtime.client(),
            cluster_name.clone(),
            Duration::from_secs(lb_stabilization_time_secs),
            Duration::from_secs(reconcile_timeout_secs),
        ));
        tokio::spawn(reconcile::engine::run(engine, shared_index.clone()).instrument(info_span!("reconcile_engine")));

        let synchronizer = Arc::new(reconcile::TargetSynchronizer::new(cloud_client.clone(), runtime.client()));
        tokio::spawn(reconcile::sync::run(synchronizer, shared_index.clone()).instrument(info_span!("target_synchronizer")));

        let status_controller = status::Controller::new(runtime.client(), shared_index);
        tokio::spawn(status_controller.run().instrument(info_span!("status_controller")));

        let global_accelerator_reconciler = Arc::new(reconcile::GlobalAcceleratorReconciler::new(cloud_client, runtime.client(), cluster_name));
        tokio::spawn(
            reconcile::global_accelerator::run(global_accelerator_reconciler, runtime.client())
                .instrument(info_span!("global_accelerator_reconciler")),
        );

        let runtime = runtime.spawn_server(Admission::new);

        if runtime.run().await.is_err() {
            bail!("aborted");
        }

        Ok(())
    }
}

async fn resolve_vpc_id_from_node(client: &kube::Client, region: &str, node_name: &str) -> Result<Option<String>> {
    let api: kube::Api<k8s::Node> = kube::Api::all(client.clone());
    let node = api.get(node_name).await?;
    let Some(provider_id) = node.spec.as_ref().and_then(|s| s.provider_id.clone()) else {
        return Ok(None);
    };
    let Some(instance_id) = provider_id.rsplit('/').next().map(str::to_string) else {
        return Ok(None);
    };

    let config = aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_string())).load().await;
    let ec2 = aws_sdk_ec2::Client::new(&config);
    let response = ec2.describe_instances().instance_ids(instance_id).send().await?;
    let vpc_id = response
        .reservations()
        .iter()
        .flat_map(|r| r.instances())
        .find_map(|i| i.vpc_id().map(str::to_string));
    Ok(vpc_id)
}
