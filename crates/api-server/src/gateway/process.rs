//! Local game process discovery for operator diagnostics

use serde::Serialize;
use sysinfo::{ProcessesToUpdate, System};

/// Longest command line reported per process
const MAX_CMD_LEN: usize = 200;

/// A running Java process that looks like a modded game client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct McProcess {
    pub pid: u32,
    pub cmd: String,
}

/// Source of the process list shown next to discovered mods
pub trait ProcessInspector: Send + Sync {
    fn game_processes(&self) -> Vec<McProcess>;
}

/// Inspector backed by the OS process table
#[derive(Debug, Default)]
pub struct SysinfoInspector;

impl ProcessInspector for SysinfoInspector {
    fn game_processes(&self) -> Vec<McProcess> {
        let mut system = System::new_all();
        system.refresh_processes(ProcessesToUpdate::All, true);

        let mut found: Vec<McProcess> = system
            .processes()
            .iter()
            .filter_map(|(pid, process)| {
                let name = process.name().to_string_lossy();
                let cmd = process
                    .cmd()
                    .iter()
                    .map(|arg| arg.to_string_lossy())
                    .collect::<Vec<_>>()
                    .join(" ");
                is_game_process(&name, &cmd).then(|| McProcess {
                    pid: pid.as_u32(),
                    cmd: cmd.chars().take(MAX_CMD_LEN).collect(),
                })
            })
            .collect();
        found.sort_by_key(|p| p.pid);
        found
    }
}

/// Java processes launched with Fabric or Minecraft on the command line
pub fn is_game_process(name: &str, cmd: &str) -> bool {
    let cmd = cmd.to_lowercase();
    name.to_lowercase().contains("java") && (cmd.contains("fabric") || cmd.contains("minecraft"))
}

/// Fixed process list
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub struct StaticInspector(pub Vec<McProcess>);

#[cfg(test)]
impl ProcessInspector for StaticInspector {
    fn game_processes(&self) -> Vec<McProcess> {
        self.0.clone()
    }
}
