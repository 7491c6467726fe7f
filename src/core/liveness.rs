//! # OS liveness probe.
//!
//! Answers "does process `pid` still exist?" using `sysinfo`. A zombie (exited
//! but not yet reaped) counts as gone: it will never connect.

use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, RefreshKind, System};

/// Returns `true` while `pid` refers to a running (non-zombie) process.
///
/// The probe runs on the blocking pool; a failed probe counts as alive so the
/// matcher falls back to its deadline.
pub(crate) async fn process_exists(pid: u32) -> bool {
    match tokio::task::spawn_blocking(move || probe(pid)).await {
        Ok(alive) => alive,
        Err(e) => {
            tracing::debug!(pid, error = %e, "liveness probe join failed");
            true
        }
    }
}

fn probe(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut system = System::new_with_specifics(RefreshKind::nothing());
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::nothing(),
    );

    match system.process(pid) {
        Some(process) => !matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::command;

    #[tokio::test]
    async fn current_process_is_alive() {
        assert!(process_exists(std::process::id()).await);
    }

    #[tokio::test]
    async fn unused_pid_is_gone() {
        // above the largest pid_max the kernel allows
        assert!(!process_exists(2_147_000_000).await);
    }

    #[tokio::test]
    async fn unreaped_exited_child_is_gone() {
        let mut child = command("true", &[]).spawn().unwrap();
        let pid = child.id().unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        assert!(!process_exists(pid).await);
        child.wait().await.unwrap();
    }
}
