//! Cloud Scheduler - control-plane CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use cloud_scheduler::{CloudConfig, Scheduler, VmId};

#[derive(Parser)]
#[command(name = "cloud-scheduler")]
#[command(about = "Cloud Scheduler - resource pool, selection and job reconciliation", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the scheduling loop and run until shutdown
    Run,

    /// Show cluster-level resource pool status
    Clusters,

    /// Show job pool status
    Jobs,

    /// Validate a configuration file without starting the loop
    CheckConfig,

    /// Look up which cluster currently owns a given VM id
    LocateVm {
        /// VM id, as printed by `clusters`
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env().filter_level(level).init();

    let config = if let Some(path) = &cli.config {
        log::info!("loading config from: {}", path.display());
        CloudConfig::load(path)?
    } else {
        CloudConfig::default()
    };

    match cli.command {
        Commands::Run => {
            let mut scheduler = Scheduler::new(config).await?;
            scheduler.run_until_shutdown().await?;
        }

        Commands::Clusters => {
            let scheduler = Scheduler::new(config).await?;
            let clusters = scheduler.pool().snapshot();
            println!("\n=== Clusters ===");
            for cluster in &clusters {
                println!(
                    "{:<16} cloud_type={:<10} slots={:<4} storage_gb={:<6} vms={}",
                    cluster.name,
                    cluster.cloud_type,
                    cluster.vm_slots,
                    cluster.storage_gb,
                    cluster.num_vms(),
                );
            }
            println!("\ntotal VMs: {}", scheduler.pool().vm_count());
            for (vmtype, fraction) in scheduler.pool().vmtype_distribution() {
                println!("  {:<16} {:.1}%", vmtype, fraction * 100.0);
            }
        }

        Commands::Jobs => {
            let scheduler = Scheduler::new(config).await?;
            let unscheduled = scheduler.jobs().unscheduled_by_user();
            let scheduled = scheduler.jobs().scheduled_jobs();

            println!("\n=== Unscheduled jobs ===");
            for (user, jobs) in &unscheduled {
                for job in jobs {
                    println!("{:<12} user={:<12} priority={}", job.id, user, job.priority);
                }
            }
            println!("\n=== Scheduled jobs ===");
            for job in &scheduled {
                println!("{:<12} user={:<12} priority={}", job.id, job.user, job.priority);
            }
        }

        Commands::LocateVm { id } => {
            let scheduler = Scheduler::new(config).await?;
            let vm_id = VmId(id.parse()?);
            match scheduler.pool().get_cluster_with_vm(vm_id) {
                Some(cluster) => println!("vm {} is on cluster {}", id, cluster.name),
                None => println!("vm {} not found in any cluster", id),
            }
        }

        Commands::CheckConfig => {
            let clusters = config.to_clusters();
            println!(
                "config valid: {} cluster section(s) declared, {} accepted",
                config.clusters.len(),
                clusters.len()
            );
            for cluster in &clusters {
                println!("  {} ({})", cluster.name, cluster.cloud_type);
            }
        }
    }

    Ok(())
}
