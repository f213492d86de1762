use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use upstream_lb::config::load_config;
use upstream_lb::load_balancer::ActiveRequestGuard;
use upstream_lb::observability::logging::init_logging;
use upstream_lb::{ClusterManager, LoadBalancerRegistry};

#[derive(Parser)]
#[command(name = "lb-sim")]
#[command(about = "Inspect a cluster config and simulate host selection", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "upstream-lb.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the config and list its clusters
    Check,
    /// List the registered load balancing policies
    Policies,
    /// Run selections against one cluster and print the distribution
    Simulate {
        cluster: String,

        #[arg(short, long, default_value_t = 1000)]
        picks: usize,

        /// Keep every chosen request open, as if none completed
        #[arg(long)]
        hold: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let registry = Arc::new(LoadBalancerRegistry::new());

    if let Commands::Policies = cli.command {
        for policy in registry.policies() {
            println!("{}", policy);
        }
        return Ok(());
    }

    let config = load_config(&cli.config)?;
    init_logging(&config.observability)?;
    let manager = ClusterManager::from_config(&config, registry);

    match cli.command {
        Commands::Check => {
            for name in manager.cluster_names() {
                let Some(cluster) = manager.cluster(&name) else {
                    continue;
                };
                println!(
                    "{}: policy={} hosts={}",
                    name,
                    cluster.policy(),
                    cluster.load_balancer().host_num(None)
                );
            }
        }
        Commands::Simulate { cluster, picks, hold } => {
            let mut counts: BTreeMap<String, usize> = BTreeMap::new();
            let mut held = Vec::new();
            let mut misses = 0;
            for _ in 0..picks {
                match manager.choose_host(&cluster, None) {
                    Some(host) => {
                        *counts.entry(host.address().to_string()).or_insert(0) += 1;
                        if hold {
                            held.push(ActiveRequestGuard::new(host));
                        }
                    }
                    None => misses += 1,
                }
            }
            for (addr, count) in &counts {
                println!("{:<24} {:>8} {:>6.2}%", addr, count, *count as f64 * 100.0 / picks.max(1) as f64);
            }
            if misses > 0 {
                eprintln!("no host available for {} of {} picks", misses, picks);
            }
        }
        Commands::Policies => {}
    }

    Ok(())
}
