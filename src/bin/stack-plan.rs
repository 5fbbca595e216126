// Copyright (c) 2025 - Cowboy AI, Inc.
//! Stack planner
//!
//! Reads `config.json`, synthesizes the backend stack and prints its plan:
//! creation waves, teardown order, security group rules and stack outputs.
//!
//! With `--dry-run` the plan is applied to, then torn down from, an
//! in-memory provider seeded with the credentials secret and hosted zone the
//! real account is expected to have. With `--nats` provisioning events of
//! the dry run are published to NATS as well.
//!
//! Run with: cargo run --bin stack-plan -- --config config.json --dry-run

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use backend_stack::backend::InMemoryCloud;
use backend_stack::config::StackConfig;
use backend_stack::deploy::{Deployer, StackState};
use backend_stack::events::{EventSink, MemoryEventSink, ProvisioningEvent};
use backend_stack::graph::ResourceSpec;
use backend_stack::nats::{NatsConfig, NatsEventSink};
use backend_stack::provision::ValidationSettings;
use backend_stack::stack::{Stack, StackBuilder};
use backend_stack::subjects::SubjectBuilder;

#[derive(Parser, Debug)]
#[command(about = "Plan the backend stack and optionally dry-run it in memory")]
struct Args {
    /// Stack configuration file
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Apply and tear down against the in-memory provider
    #[arg(long)]
    dry_run: bool,

    /// Also publish dry-run events to this NATS server
    #[arg(long)]
    nats: Option<String>,
}

/// Fans events out to several sinks
struct Tee(Vec<Arc<dyn EventSink>>);

#[async_trait::async_trait]
impl EventSink for Tee {
    async fn publish(
        &self,
        event: &ProvisioningEvent,
    ) -> backend_stack::errors::ProvisionResult<()> {
        for sink in &self.0 {
            sink.publish(event).await?;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    let config = StackConfig::from_file(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    let stack = StackBuilder::new(config.clone())
        .synth()
        .context("Failed to synthesize stack")?;

    print_plan(&stack)?;

    if args.dry_run {
        dry_run(&config, &stack, args.nats.as_deref()).await?;
    }
    Ok(())
}

fn print_plan(stack: &Stack) -> Result<()> {
    println!("Stack for https://{}", stack.fqdn);
    println!();
    println!("Creation waves:");
    for (i, wave) in stack.graph.creation_waves()?.iter().enumerate() {
        let members: Vec<String> = wave.iter().map(|d| d.to_string()).collect();
        println!("  {:>2}. {}", i + 1, members.join(", "));
    }

    println!();
    println!("Teardown order:");
    let order: Vec<String> = stack
        .graph
        .teardown_order()?
        .iter()
        .map(|id| id.to_string())
        .collect();
    println!("  {}", order.join(" -> "));

    println!();
    println!("Security groups:");
    for descriptor in stack.graph.descriptors() {
        if let ResourceSpec::SecurityGroup(sg) = &descriptor.spec {
            println!("  {}", sg.id);
            for rule in &sg.ingress {
                println!("    {}", rule);
            }
        }
    }

    println!();
    println!("Subnets:");
    for subnet in &stack.network.subnets {
        println!(
            "  {:<10} {:<12} {:<18} internet={}",
            subnet.group,
            subnet.availability_zone,
            subnet.cidr.to_string(),
            subnet.routes_to_internet()
        );
    }

    println!();
    println!("Outputs:");
    for (name, reference) in &stack.outputs {
        println!("  {} = {}", name, reference);
    }
    Ok(())
}

async fn dry_run(config: &StackConfig, stack: &Stack, nats: Option<&str>) -> Result<()> {
    info!("🧪 Dry run against the in-memory provider");

    let secrets = &config.secrets;
    let cloud = Arc::new(
        InMemoryCloud::new()
            .with_secret(
                &secrets.credentials_name,
                [
                    (secrets.username_field.clone(), "dry-run-user".to_string()),
                    (secrets.password_field.clone(), "dry-run-password".to_string()),
                ],
            )
            .with_hosted_zone(&config.domain_name),
    );

    let memory = Arc::new(MemoryEventSink::new());
    let mut sinks: Vec<Arc<dyn EventSink>> = vec![memory.clone()];
    let mut published = None;
    if let Some(url) = nats {
        let nats_config = NatsConfig {
            servers: vec![url.to_string()],
            ..NatsConfig::default()
        };
        match NatsEventSink::connect(&nats_config).await {
            Ok(sink) => {
                info!(
                    "📡 Publishing events on {}",
                    SubjectBuilder::build_all(&nats_config.subject_root)
                );
                let sink = Arc::new(sink);
                sinks.push(sink.clone());
                published = Some(sink);
            }
            Err(e) => warn!("Publishing to NATS disabled: {}", e),
        }
    }

    let deployer = Deployer::new(cloud.clone())
        .with_events(Arc::new(Tee(sinks)))
        .with_validation(ValidationSettings {
            poll_interval: Duration::from_millis(10),
            timeout: Duration::from_secs(5),
        });

    let mut state = StackState::new();
    deployer
        .deploy(stack, &mut state)
        .await
        .context("Dry-run deployment failed")?;
    for (name, value) in &state.stack_outputs {
        println!("  {} = {}", name, value);
    }

    deployer
        .destroy(stack, &mut state)
        .await
        .context("Dry-run teardown failed")?;
    if let Some(sink) = published {
        sink.client().flush().await.context("Failed to flush NATS")?;
    }

    info!(
        "✅ Dry run complete: {} events, {} resources left",
        memory.events().len(),
        cloud.live_resources().len()
    );
    Ok(())
}
