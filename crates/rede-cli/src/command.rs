//! Command line parsing for rede-admin.

use rede_hierarchy::LeaderId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Coordinators,
    Tree(LeaderId),
    Stats(LeaderId),
    Path(LeaderId),
    Detached,
    Audit(LeaderId),
    Promote(LeaderId),
    PromoteBranch(LeaderId),
    Demote(LeaderId),
    SetParent { id: LeaderId, parent: LeaderId },
    Remove(LeaderId),
    Move { id: LeaderId, new_parent: LeaderId },
    Deactivate(LeaderId),
    Help,
}

impl Command {
    /// Parse the arguments after the program name.
    pub fn parse(args: &[String]) -> Result<Self, String> {
        let Some(name) = args.first() else {
            return Err("missing command".to_string());
        };
        let arg = |i: usize, what: &str| {
            args.get(i)
                .map(|s| LeaderId::new(s.as_str()))
                .ok_or_else(|| format!("{} requires a {} argument", name, what))
        };

        let cmd = match name.as_str() {
            "coordinators" => Self::Coordinators,
            "tree" => Self::Tree(arg(1, "coordinator_id")?),
            "stats" => Self::Stats(arg(1, "leader_id")?),
            "path" => Self::Path(arg(1, "leader_id")?),
            "detached" => Self::Detached,
            "audit" => Self::Audit(arg(1, "coordinator_id")?),
            "promote" => Self::Promote(arg(1, "leader_id")?),
            "promote-branch" => Self::PromoteBranch(arg(1, "leader_id")?),
            "demote" => Self::Demote(arg(1, "leader_id")?),
            "set-parent" => Self::SetParent {
                id: arg(1, "leader_id")?,
                parent: arg(2, "parent_id")?,
            },
            "remove" => Self::Remove(arg(1, "leader_id")?),
            "move" => Self::Move {
                id: arg(1, "leader_id")?,
                new_parent: arg(2, "new_parent_id")?,
            },
            "deactivate" => Self::Deactivate(arg(1, "leader_id")?),
            "-h" | "--help" | "help" => Self::Help,
            other => return Err(format!("Unknown command: {}", other)),
        };
        Ok(cmd)
    }

    /// Whether the snapshot must be written back after success.
    pub fn mutates(&self) -> bool {
        matches!(
            self,
            Self::Promote(_)
                | Self::PromoteBranch(_)
                | Self::Demote(_)
                | Self::SetParent { .. }
                | Self::Remove(_)
                | Self::Move { .. }
                | Self::Deactivate(_)
        )
    }
}

pub fn print_usage() {
    eprintln!("rede-admin - Inspect and restructure leader hierarchies");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  rede-admin coordinators                  List coordinators with network totals");
    eprintln!("  rede-admin tree <coordinator_id>         Print a coordinator's tree");
    eprintln!("  rede-admin stats <leader_id>             Totals for a leader's branch");
    eprintln!("  rede-admin path <leader_id>              Leader and its ancestors");
    eprintln!("  rede-admin detached                      Branches left without a coordinator");
    eprintln!("  rede-admin audit <coordinator_id>        Report leaders at the wrong level");
    eprintln!("  rede-admin promote <leader_id>           Make a leader a coordinator");
    eprintln!("  rede-admin promote-branch <leader_id>    Same, reporting subordinates moved");
    eprintln!("  rede-admin demote <leader_id>            Clear the coordinator role");
    eprintln!("  rede-admin set-parent <id> <parent_id>   Attach a leader under a parent");
    eprintln!("  rede-admin remove <leader_id>            Detach a leader from its tree");
    eprintln!("  rede-admin move <id> <new_parent_id>     Move a branch under a new parent");
    eprintln!("  rede-admin deactivate <leader_id>        Soft-delete a leader");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  REDE_SNAPSHOT        Leader records (default: ./rede-data/leaders.json)");
    eprintln!("  REDE_PAGE_SIZE       Rows per closure page");
    eprintln!("  REDE_MAX_DEPTH       Deepest allowed level");
    eprintln!("  REDE_OP_TIMEOUT_MS   Timeout per store call");
    eprintln!("  RUST_LOG             Log filter (default: rede=info)");
}
