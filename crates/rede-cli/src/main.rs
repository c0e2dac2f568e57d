//! rede-admin CLI tool
//!
//! Runs one hierarchy command against a JSON snapshot of leader records and
//! writes the snapshot back when the command changed something.
//!
//! Usage:
//!   rede-admin coordinators
//!   rede-admin tree <coordinator_id>
//!   rede-admin move <leader_id> <new_parent_id>
//!   rede-admin help

mod command;
mod snapshot;

use std::sync::Arc;

use rede_engine::{EngineConfig, HierarchyService};
use rede_hierarchy::TreeNode;
use rede_store::MemoryStore;
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use command::{print_usage, Command};

type Service = HierarchyService<MemoryStore>;

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_tree(tree: &TreeNode) {
    for (depth, node) in tree.iter() {
        let leader = &node.leader;
        println!(
            "{:indent$}{} ({}) level={} cadastros={} pontos={}",
            "",
            leader.name,
            leader.id,
            leader
                .hierarchy_level
                .map_or_else(|| "-".to_string(), |l| l.to_string()),
            leader.cadastros,
            leader.pontuacao_total,
            indent = depth as usize * 2
        );
    }
}

async fn execute(service: &Service, cmd: Command) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        Command::Coordinators => {
            let summaries = service.list_coordinators_with_stats().await?;
            if summaries.is_empty() {
                println!("(none)");
            }
            for s in summaries {
                println!(
                    "{} ({}) leaders={} cadastros={} pontos={}",
                    s.coordinator.name,
                    s.coordinator.id,
                    s.total_leaders,
                    s.total_cadastros,
                    s.total_pontos
                );
            }
        }
        Command::Tree(id) => match service.get_leader_tree(&id).await? {
            Some(tree) => print_tree(&tree),
            None => println!("(no active tree)"),
        },
        Command::Stats(id) => print_json(&service.get_subtree_stats(&id).await?)?,
        Command::Path(id) => {
            for leader in service.ancestry_path(&id).await? {
                println!("{} ({})", leader.name, leader.id);
            }
        }
        Command::Detached => print_json(&service.detached_branches().await?)?,
        Command::Audit(id) => {
            let mismatches = service.audit_tree(&id).await?;
            if mismatches.is_empty() {
                println!("ok - every level matches its depth");
            } else {
                print_json(&mismatches)?;
            }
        }
        Command::Promote(id) => print_json(&service.promote_to_coordinator(&id).await?)?,
        Command::PromoteBranch(id) => {
            print_json(&service.promote_to_coordinator_with_subordinates(&id).await?)?
        }
        Command::Demote(id) => print_json(&service.demote_coordinator(&id).await?)?,
        Command::SetParent { id, parent } => {
            service.set_parent_leader(&id, &parent).await?;
            println!("{} now reports to {}", id, parent);
        }
        Command::Remove(id) => {
            service.remove_from_tree(&id).await?;
            println!("{} removed from its tree", id);
        }
        Command::Move { id, new_parent } => {
            service.move_leader_branch(&id, &new_parent).await?;
            println!("branch {} moved under {}", id, new_parent);
        }
        Command::Deactivate(id) => print_json(&service.deactivate_leader(&id).await?)?,
        Command::Help => print_usage(),
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    // Logs go to stderr; stdout carries command output.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rede=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        print_usage();
        std::process::exit(1);
    }

    let cmd = match Command::parse(&args) {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_usage();
            std::process::exit(1);
        }
    };
    if cmd == Command::Help {
        print_usage();
        return;
    }

    let path = snapshot::path_from_env();
    let rows = match snapshot::load(&path) {
        Ok(rows) => rows,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let store = Arc::new(MemoryStore::from_snapshot(rows));
    let service = HierarchyService::new(Arc::clone(&store), EngineConfig::default());
    let mutates = cmd.mutates();

    if let Err(e) = execute(&service, cmd).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    if mutates {
        if let Err(e) = snapshot::save(&path, store.snapshot().await) {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
        tracing::info!("Saved snapshot to {:?}", path);
    }
}
