use clap::Parser;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};

use uplink_nat::config::cli::{print_default_config, CliArgs};
use uplink_nat::config::AppConfig;
use uplink_nat::firewall::iptables::IptablesFirewall;
use uplink_nat::firewall::Firewall;
use uplink_nat::network::dry_run::DryRun;
use uplink_nat::network::netlink::NetlinkNetwork;
use uplink_nat::network::NetworkState;
use uplink_nat::reconcile::{Reconciler, RunOutcome, Trigger};
use uplink_nat::{logging, AppError};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    if cli.print_default_config {
        print_default_config();
        return ExitCode::SUCCESS;
    }

    let config = match AppConfig::load(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("uplink-nat: {}", e);
            return ExitCode::FAILURE;
        }
    };

    logging::init(&config);

    if cli.validate_config {
        info!("Configuration is valid");
        return ExitCode::SUCCESS;
    }

    match run(&cli, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "reconciliation failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &CliArgs, config: &AppConfig) -> Result<(), AppError> {
    let network = NetlinkNetwork::new(config.ip_forward_path.clone())?;
    let firewall = IptablesFirewall::new(config.iptables_path.clone(), &config.chain_prefix);
    let trigger = cli.trigger();

    if cli.dry_run {
        let reconciler = Reconciler::new(DryRun::new(network), DryRun::new(firewall), config);
        execute(&reconciler, config, &trigger).await
    } else {
        let reconciler = Reconciler::new(network, firewall, config);
        execute(&reconciler, config, &trigger).await
    }
}

async fn execute<N, F>(
    reconciler: &Reconciler<N, F>,
    config: &AppConfig,
    trigger: &Trigger,
) -> Result<(), AppError>
where
    N: NetworkState,
    F: Firewall,
{
    let timeout: Duration = config.run_timeout;
    let outcome = tokio::time::timeout(timeout, reconciler.run_exclusive(&config.lock_file, trigger))
        .await
        .map_err(|_| AppError::Timeout(timeout))??;

    match outcome {
        RunOutcome::Completed(selection) => info!(outcome = %selection, "reconciliation complete"),
        RunOutcome::Superseded => {}
    }

    Ok(())
}
