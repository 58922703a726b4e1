//! shardis-cli: command-line client for a sharded cluster.
//!
//! Loads a cluster config, then either inspects placement (`locate`,
//! `nodes`) or routes a single command through the router and prints the
//! reply.

mod format;
mod plan;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;
use shardis::{Access, ClusterConfig, Router};
use tracing::{debug, warn};

/// Routes commands through a sharded cluster.
#[derive(Parser)]
#[command(name = "shardis-cli", version, about)]
struct Args {
    /// Path to the cluster config file.
    #[arg(short, long, env = "SHARDIS_CONFIG", default_value = "shardis.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show which shard and nodes a key maps to.
    Locate { key: String },
    /// List every configured node.
    Nodes,
    /// Route one command and print the reply.
    Exec {
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },
    /// Print a config template and exit.
    ConfigTemplate,
}

fn exit_err(msg: impl std::fmt::Display) -> ExitCode {
    eprintln!("{}", format!("error: {msg}").red());
    ExitCode::FAILURE
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shardis=info,shardis_cli=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Command::ConfigTemplate = args.command {
        return match ClusterConfig::default().to_toml() {
            Ok(toml) => {
                println!("{toml}");
                ExitCode::SUCCESS
            }
            Err(e) => exit_err(e),
        };
    }

    let config = match ClusterConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => return exit_err(e),
    };
    debug!(path = %args.config.display(), "loaded cluster config");
    let mut router = match Router::from_config(&config, config.tcp_connector()) {
        Ok(router) => router,
        Err(e) => return exit_err(e),
    };
    debug!(shards = router.registry().len(), "router ready");

    match args.command {
        Command::Locate { key } => locate(&router, &key),
        Command::Nodes => {
            for id in router.registry().ids() {
                let Some(endpoints) = router.registry().get(id.as_str()) else {
                    continue;
                };
                if let Some(master) = &endpoints.master {
                    println!("{id}\t{master}\tmaster");
                }
                for slave in &endpoints.slaves {
                    println!("{id}\t{slave}\tslave");
                }
            }
            ExitCode::SUCCESS
        }
        Command::Exec { command } => exec(&mut router, &command).await,
        Command::ConfigTemplate => ExitCode::SUCCESS,
    }
}

fn locate<C: shardis::Connector>(router: &Router<C>, key: &str) -> ExitCode {
    let placement = router.shard_of(key).and_then(|shard| {
        let master = router.resolve(key, Access::Write)?;
        let read = router.resolve(key, Access::Read)?;
        Ok((shard, master, read))
    });
    match placement {
        Ok((shard, master, read)) => {
            println!("key:       {key}");
            println!("hash key:  {}", router.hash_key(key));
            println!("shard:     {}", shard.as_str().cyan());
            println!("master:    {master}");
            println!("read from: {read}");
            ExitCode::SUCCESS
        }
        Err(e) => exit_err(e),
    }
}

async fn exec<C: shardis::Connector>(router: &mut Router<C>, words: &[String]) -> ExitCode {
    let plan = match plan::plan(words) {
        Ok(plan) => plan,
        Err(e) => return exit_err(e),
    };
    debug!(?plan, "planned command");
    let printed = match plan {
        plan::Plan::Routed(cmd) => router.call(cmd).await.map(|f| format::format_response(&f)),
        plan::Plan::RandomKey => router.randomkey().await.map(|f| format::format_response(&f)),
        plan::Plan::Broadcast(args) => router
            .broadcast(&args)
            .await
            .map(|replies| format::format_node_replies(&replies)),
    };
    match printed {
        Ok(text) => {
            println!("{text}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            if e.is_partial_failure() {
                warn!(error = %e, "command left the cluster partially updated");
            }
            exit_err(e)
        }
    }
}
